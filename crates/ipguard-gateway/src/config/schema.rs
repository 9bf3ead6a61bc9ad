use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use ipnet::IpNet;
use serde::Deserialize;
use ipguard_core::error::{GuardError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub policy: PolicySection,

    #[serde(default)]
    pub proxy: ProxySection,

    #[serde(default)]
    pub audit: AuditSection,

    pub upstream: UpstreamSection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(GuardError::UnsupportedVersion);
        }

        self.gateway.validate()?;
        self.policy.validate()?;
        self.proxy.validate()?;
        self.audit.validate()?;
        self.upstream.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Single origin allowed by CORS. None disables the CORS layer.
    #[serde(default)]
    pub cors_origin: Option<String>,

    /// Shared secret for `/admin/*`. None leaves the admin routes unmounted.
    #[serde(default)]
    pub admin_key: Option<String>,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            cors_origin: None,
            admin_key: None,
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        self.listen.parse::<SocketAddr>().map_err(|_| {
            GuardError::BadRequest(format!(
                "gateway.listen must be a socket address: {}",
                self.listen
            ))
        })?;
        if let Some(origin) = &self.cors_origin {
            if !(origin.starts_with("http://") || origin.starts_with("https://")) {
                return Err(GuardError::BadRequest(
                    "gateway.cors_origin must start with http:// or https://".into(),
                ));
            }
        }
        if matches!(&self.admin_key, Some(k) if k.len() < 16) {
            return Err(GuardError::BadRequest(
                "gateway.admin_key must be at least 16 characters".into(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|_| GuardError::BadRequest(format!("invalid gateway.listen: {}", self.listen)))
    }
}

fn default_listen() -> String {
    "0.0.0.0:3000".into()
}

/// Abuse thresholds and ban lifetime.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySection {
    /// Counting window `W` for invalid queries.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Invalid queries within one window that trigger a ban (`N`).
    #[serde(default = "default_invalid_threshold")]
    pub invalid_threshold: u32,

    /// None bans for the rest of the process lifetime.
    #[serde(default)]
    pub ban_ttl_secs: Option<u64>,

    #[serde(default = "default_record_idle_ttl_secs")]
    pub record_idle_ttl_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            invalid_threshold: default_invalid_threshold(),
            ban_ttl_secs: None,
            record_idle_ttl_secs: default_record_idle_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl PolicySection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=86_400).contains(&self.window_secs) {
            return Err(GuardError::BadRequest(
                "policy.window_secs must be between 1 and 86400".into(),
            ));
        }
        if self.invalid_threshold == 0 {
            return Err(GuardError::BadRequest("policy.invalid_threshold must be >= 1".into()));
        }
        if self.ban_ttl_secs == Some(0) {
            return Err(GuardError::BadRequest(
                "policy.ban_ttl_secs must be > 0 (omit it for permanent bans)".into(),
            ));
        }
        if self.record_idle_ttl_secs < self.window_secs {
            return Err(GuardError::BadRequest(
                "policy.record_idle_ttl_secs must be >= window_secs".into(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(GuardError::BadRequest("policy.sweep_interval_secs must be > 0".into()));
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn ban_ttl(&self) -> Option<Duration> {
        self.ban_ttl_secs.map(Duration::from_secs)
    }

    pub fn record_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.record_idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_window_secs() -> u64 {
    15 * 60
}
fn default_invalid_threshold() -> u32 {
    5
}
fn default_record_idle_ttl_secs() -> u64 {
    60 * 60
}
fn default_sweep_interval_secs() -> u64 {
    60
}

/// Trusted proxy hops and forwarded-chain selection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxySection {
    /// Bare addresses or CIDR networks.
    #[serde(default)]
    pub trusted: Vec<String>,

    /// Position in the untrusted part of `X-Forwarded-For`:
    /// 0 = left-most, negative counts from the right (-1 = right-most).
    #[serde(default)]
    pub forwarded_index: i32,
}

impl ProxySection {
    pub fn validate(&self) -> Result<()> {
        self.trusted_networks().map(|_| ())
    }

    pub fn trusted_networks(&self) -> Result<Vec<IpNet>> {
        self.trusted.iter().map(|raw| parse_network(raw)).collect()
    }
}

fn parse_network(raw: &str) -> Result<IpNet> {
    let s = raw.trim();
    if let Ok(net) = IpNet::from_str(s) {
        return Ok(net);
    }
    s.parse::<std::net::IpAddr>()
        .map(|ip| IpNet::from(ip.to_canonical()))
        .map_err(|_| GuardError::BadRequest(format!("invalid proxy.trusted entry: {raw}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Discord,
    #[default]
    Log,
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditSection {
    #[serde(default)]
    pub sink: SinkKind,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Emit a `RouteAccess` event for every admitted request.
    #[serde(default)]
    pub log_access: bool,

    #[serde(default)]
    pub webhooks: WebhookUrls,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            sink: SinkKind::default(),
            queue_capacity: default_queue_capacity(),
            timeout_ms: default_timeout_ms(),
            log_access: false,
            webhooks: WebhookUrls::default(),
        }
    }
}

impl AuditSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=65_536).contains(&self.queue_capacity) {
            return Err(GuardError::BadRequest(
                "audit.queue_capacity must be between 1 and 65536".into(),
            ));
        }
        if !(100..=60_000).contains(&self.timeout_ms) {
            return Err(GuardError::BadRequest(
                "audit.timeout_ms must be between 100 and 60000".into(),
            ));
        }
        if self.sink == SinkKind::Discord && self.webhooks.is_empty() {
            return Err(GuardError::BadRequest(
                "audit.sink=discord requires at least one webhook url".into(),
            ));
        }
        self.webhooks.validate()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookUrls {
    #[serde(default)]
    pub logs: Option<String>,
    #[serde(default)]
    pub bans: Option<String>,
    #[serde(default)]
    pub errors: Option<String>,
}

impl WebhookUrls {
    fn is_empty(&self) -> bool {
        self.logs.is_none() && self.bans.is_none() && self.errors.is_none()
    }

    fn validate(&self) -> Result<()> {
        for (name, url) in [("logs", &self.logs), ("bans", &self.bans), ("errors", &self.errors)] {
            if let Some(u) = url {
                if !u.starts_with("https://") {
                    return Err(GuardError::BadRequest(format!(
                        "audit.webhooks.{name} must be an https url"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn default_queue_capacity() -> usize {
    1024
}
fn default_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamSection {
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl UpstreamSection {
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(GuardError::BadRequest(
                "upstream.base_url must start with http:// or https://".into(),
            ));
        }
        if !(100..=60_000).contains(&self.timeout_ms) {
            return Err(GuardError::BadRequest(
                "upstream.timeout_ms must be between 100 and 60000".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
