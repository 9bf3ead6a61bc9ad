//! Upstream user-data API.

use async_trait::async_trait;
use serde_json::Value;

use ipguard_core::error::{GuardError, Result};

use super::steam_user::ProfileRef;
use crate::config::UpstreamSection;

/// Where validated lookups are forwarded.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn fetch(&self, profile: &ProfileRef) -> Result<Value>;
}

/// `GET {base_url}?kind=..&value=..[&key=..]` over reqwest.
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpUpstream {
    pub fn new(cfg: &UpstreamSection) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .build()
            .map_err(|e| GuardError::Internal(format!("upstream client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone(),
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, profile: &ProfileRef) -> Result<Value> {
        let value = profile.value();
        let mut params = vec![("kind", profile.kind()), ("value", value.as_str())];
        if let Some(key) = &self.api_key {
            params.push(("key", key.as_str()));
        }

        let resp = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| GuardError::Upstream(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GuardError::Upstream(format!("upstream answered {status}")));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| GuardError::Upstream(format!("invalid upstream body: {e}")))
    }
}
