//! `/steam-user` lookup route.
//!
//! Validates the profile URL, reports invalid queries to the governance
//! engine, and forwards valid ones upstream.

use std::time::Instant;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use ipguard_core::error::{GuardError, Result};

use super::error_response;
use crate::app_state::AppState;
use crate::context::ClientIdentity;

const MAX_URL_LEN: usize = 256;
const STEAM_HOST: &str = "steamcommunity.com";
const STEAMID64_PREFIX: &str = "7656119";

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub url: Option<String>,
}

/// A profile reference pulled out of a community URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileRef {
    Vanity(String),
    SteamId(u64),
}

impl ProfileRef {
    pub fn kind(&self) -> &'static str {
        match self {
            ProfileRef::Vanity(_) => "vanity",
            ProfileRef::SteamId(_) => "steamid",
        }
    }

    pub fn value(&self) -> String {
        match self {
            ProfileRef::Vanity(v) => v.clone(),
            ProfileRef::SteamId(id) => id.to_string(),
        }
    }
}

fn invalid(reason: &str) -> GuardError {
    GuardError::InvalidQuery(reason.to_string())
}

/// Accepts `http(s)://[www.]steamcommunity.com/id/<vanity>[/]` and
/// `http(s)://[www.]steamcommunity.com/profiles/<steamid64>[/]`.
pub fn parse_profile_url(raw: &str) -> Result<ProfileRef> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(invalid("empty url"));
    }
    if s.len() > MAX_URL_LEN {
        return Err(invalid("url too long"));
    }

    let rest = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"))
        .ok_or_else(|| invalid("unsupported scheme"))?;

    let (host, path) = rest.split_once('/').ok_or_else(|| invalid("missing profile path"))?;
    let host = host.to_ascii_lowercase();
    if host != STEAM_HOST && host != format!("www.{STEAM_HOST}") {
        return Err(invalid("not a steamcommunity.com url"));
    }
    if path.contains(|c: char| c == '?' || c == '#') {
        return Err(invalid("query strings and fragments are not allowed"));
    }

    let path = path.strip_suffix('/').unwrap_or(path);
    let (section, ident) = path.split_once('/').ok_or_else(|| invalid("missing profile path"))?;

    match section {
        "id" => {
            let ok_len = (2..=32).contains(&ident.len());
            let ok_chars = ident
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !ok_len || !ok_chars {
                return Err(invalid("invalid vanity name"));
            }
            Ok(ProfileRef::Vanity(ident.to_string()))
        }
        "profiles" => {
            if ident.len() != 17 || !ident.starts_with(STEAMID64_PREFIX) {
                return Err(invalid("invalid steamid64"));
            }
            ident
                .parse::<u64>()
                .map(ProfileRef::SteamId)
                .map_err(|_| invalid("invalid steamid64"))
        }
        _ => Err(invalid("unsupported profile path")),
    }
}

pub async fn lookup(
    State(app): State<AppState>,
    identity: ClientIdentity,
    query: Option<Query<LookupQuery>>,
) -> Response {
    let engine = app.engine();
    let raw = query.and_then(|Query(q)| q.url).unwrap_or_default();

    let profile = match parse_profile_url(&raw) {
        Ok(p) => p,
        Err(e) => {
            let reason = match &e {
                GuardError::InvalidQuery(r) => r.as_str(),
                _ => "invalid query",
            };
            engine.report_invalid_query(identity.id(), &raw, reason);
            return error_response(&e);
        }
    };

    engine.report_valid_query(identity.id(), &raw);

    let started = Instant::now();
    let result = app.upstream().fetch(&profile).await;
    let label = if result.is_ok() { "ok" } else { "error" };
    app.metrics()
        .upstream_duration
        .observe(&[("result", label)], started.elapsed());

    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            tracing::warn!(
                ip = %identity.id(),
                kind = profile.kind(),
                error = %e,
                "upstream lookup failed"
            );
            error_response(&e)
        }
    }
}
