//! Gateway config loader (strict parsing).

pub mod schema;

use std::fs;

use ipguard_core::error::{GuardError, Result};

pub use schema::{
    AuditSection, GatewayConfig, GatewaySection, PolicySection, ProxySection, SinkKind,
    UpstreamSection, WebhookUrls,
};

/// Env var naming the config file; falls back to [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_ENV: &str = "IPGUARD_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "ipguard.yaml";

pub fn config_path() -> String {
    std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

pub fn load_from_file(path: &str) -> Result<GatewayConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| GuardError::Internal(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig = serde_yaml::from_str(s)
        .map_err(|e| GuardError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
