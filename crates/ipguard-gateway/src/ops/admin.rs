//! Admin-only ban management.
//!
//! Mounted only when `gateway.admin_key` is configured. Every call must carry
//! the key in `X-Admin-Key`.

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use ipguard_core::{ClientId, GuardError};

use crate::app_state::AppState;
use crate::services::error_response;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

#[derive(Debug, Serialize)]
pub struct BanView {
    pub ip: ClientId,
    pub reason: String,
    pub permanent: bool,
    pub expires_in_secs: Option<u64>,
}

/// Rejects requests without the configured admin key.
pub async fn require_admin(State(app): State<AppState>, req: Request, next: Next) -> Response {
    let Some(configured) = app.cfg().gateway.admin_key.as_deref() else {
        return error_response(&GuardError::Unauthorized("admin access disabled".into()));
    };

    let provided = req
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if constant_time_eq(key.as_bytes(), configured.as_bytes()) => next.run(req).await,
        Some(_) => {
            tracing::warn!(route = %req.uri().path(), "admin endpoint accessed with invalid key");
            error_response(&GuardError::Unauthorized("invalid admin key".into()))
        }
        None => error_response(&GuardError::Unauthorized("X-Admin-Key header required".into())),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub async fn list_bans(State(app): State<AppState>) -> Json<Vec<BanView>> {
    let bans = app.engine().bans();
    let views = bans
        .list()
        .into_iter()
        .map(|e| BanView {
            ip: e.identifier,
            permanent: e.expires_at.is_none(),
            expires_in_secs: bans.remaining(e.identifier).map(|d| d.as_secs()),
            reason: e.reason,
        })
        .collect();
    Json(views)
}

pub async fn unban(State(app): State<AppState>, Path(ip): Path<String>) -> Response {
    let id = match ClientId::parse(&ip) {
        Ok(id) => id,
        Err(_) => {
            return error_response(&GuardError::BadRequest(format!("not an ip address: {ip}")))
        }
    };
    let removed = app.engine().unban(id);
    Json(json!({ "ip": id, "unbanned": removed })).into_response()
}
