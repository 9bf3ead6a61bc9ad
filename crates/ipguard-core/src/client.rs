//! Canonical client identifier.
//!
//! Every tracking and ban table is keyed by `ClientId`. Equivalent textual
//! forms of one address (IPv4-mapped IPv6, bracketed IPv6, entries carrying a
//! port) collapse to the same value, and `Display` renders the RFC 5952 form.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::GuardError;

/// Normalized client IP used as the key for all governance state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(IpAddr);

impl ClientId {
    /// Canonicalize an already-parsed address.
    pub fn from_ip(ip: IpAddr) -> Self {
        Self(ip.to_canonical())
    }

    /// Parse one textual address as seen in transport metadata or an
    /// `X-Forwarded-For` entry.
    pub fn parse(raw: &str) -> Result<Self, GuardError> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(GuardError::MalformedAddress("empty address".into()));
        }

        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self::from_ip(ip));
        }
        // "1.2.3.4:5678" or "[2001:db8::1]:443"
        if let Ok(sa) = s.parse::<SocketAddr>() {
            return Ok(Self::from_ip(sa.ip()));
        }
        // "[2001:db8::1]"
        if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            if let Ok(ip) = strip_zone(inner).parse::<IpAddr>() {
                return Ok(Self::from_ip(ip));
            }
        }
        // "fe80::1%eth0"
        if let Ok(ip) = strip_zone(s).parse::<IpAddr>() {
            return Ok(Self::from_ip(ip));
        }

        Err(GuardError::MalformedAddress(format!("unparseable address: {s}")))
    }

    pub fn ip(&self) -> IpAddr {
        self.0
    }
}

fn strip_zone(s: &str) -> &str {
    s.split_once('%').map(|(addr, _)| addr).unwrap_or(s)
}

impl From<IpAddr> for ClientId {
    fn from(ip: IpAddr) -> Self {
        Self::from_ip(ip)
    }
}

impl FromStr for ClientId {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for ClientId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn mapped_v6_collapses_to_v4() {
        let a = ClientId::parse("::ffff:203.0.113.5").unwrap();
        let b = ClientId::parse("203.0.113.5").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "203.0.113.5");
    }

    #[test]
    fn v6_spellings_are_equivalent() {
        let forms = [
            "2001:db8::1",
            "2001:0DB8:0000:0000:0000:0000:0000:0001",
            "[2001:db8::1]",
            "[2001:db8::1]:8443",
        ];
        let ids: Vec<ClientId> = forms.iter().map(|f| ClientId::parse(f).unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(ids[0].to_string(), "2001:db8::1");
    }

    #[test]
    fn port_and_whitespace_are_dropped() {
        let id = ClientId::parse("  198.51.100.9:51234 ").unwrap();
        assert_eq!(id.to_string(), "198.51.100.9");
    }

    #[test]
    fn zone_is_dropped() {
        let id = ClientId::parse("fe80::1%eth0").unwrap();
        assert_eq!(id.to_string(), "fe80::1");
    }

    #[test]
    fn garbage_is_malformed() {
        for bad in ["", "   ", "unknown", "300.1.1.1", "1.2.3", "[::1"] {
            let err = ClientId::parse(bad).unwrap_err();
            assert!(matches!(err, GuardError::MalformedAddress(_)), "{bad}");
        }
    }
}
