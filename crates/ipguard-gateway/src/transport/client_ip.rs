//! Client identity resolution from transport metadata.
//!
//! Only a direct peer inside a trusted-proxy network may speak for the client
//! through `X-Forwarded-For`. Anyone else is identified by the socket peer,
//! whatever headers they send.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;
use ipnet::IpNet;

use ipguard_core::{ClientId, GuardError, Result};

use crate::config::ProxySection;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

#[derive(Debug, Clone)]
pub struct IpExtractor {
    trusted: Vec<IpNet>,
    forwarded_index: i32,
}

impl IpExtractor {
    pub fn new(trusted: Vec<IpNet>, forwarded_index: i32) -> Self {
        Self { trusted, forwarded_index }
    }

    pub fn from_config(cfg: &ProxySection) -> Result<Self> {
        Ok(Self::new(cfg.trusted_networks()?, cfg.forwarded_index))
    }

    fn is_trusted(&self, ip: IpAddr) -> bool {
        self.trusted.iter().any(|net| net.contains(&ip))
    }

    /// Resolve the canonical identifier for one request.
    ///
    /// Fails with `MalformedAddress` when no peer is known, or when a trusted
    /// proxy hands over a chain we cannot read. Callers must deny on error.
    pub fn resolve(&self, peer: Option<SocketAddr>, headers: &HeaderMap) -> Result<ClientId> {
        let peer = peer
            .map(|p| ClientId::from_ip(p.ip()))
            .ok_or_else(|| GuardError::MalformedAddress("no transport peer".into()))?;

        if !self.is_trusted(peer.ip()) {
            return Ok(peer);
        }

        let mut chain = Vec::new();
        for value in headers.get_all(X_FORWARDED_FOR) {
            let value = value.to_str().map_err(|_| {
                GuardError::MalformedAddress("non-ascii x-forwarded-for".into())
            })?;
            for entry in value.split(',') {
                chain.push(ClientId::parse(entry)?);
            }
        }
        // Hops that are our own proxies never identify the client.
        chain.retain(|id| !self.is_trusted(id.ip()));

        if chain.is_empty() {
            return Ok(peer);
        }

        pick(&chain, self.forwarded_index).ok_or_else(|| {
            GuardError::MalformedAddress(format!(
                "forwarded_index {} out of range for {} hops",
                self.forwarded_index,
                chain.len()
            ))
        })
    }
}

fn pick(chain: &[ClientId], index: i32) -> Option<ClientId> {
    let pos = if index >= 0 {
        usize::try_from(index).ok()?
    } else {
        let back = usize::try_from(index.unsigned_abs()).ok()?;
        chain.len().checked_sub(back)?
    };
    chain.get(pos).copied()
}
