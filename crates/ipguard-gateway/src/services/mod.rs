//! Route handlers behind the governance middleware.

pub mod steam_user;
pub mod upstream;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use ipguard_core::GuardError;

pub use steam_user::{lookup, parse_profile_url, ProfileRef};
pub use upstream::{HttpUpstream, Upstream};

/// JSON error body: `{"code": "...", "msg": "..."}`.
pub fn error_response(err: &GuardError) -> Response {
    let code = err.client_code();
    let status =
        StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let msg = match err {
        GuardError::InvalidQuery(m) | GuardError::BadRequest(m) | GuardError::Unauthorized(m) => {
            m.clone()
        }
        GuardError::Upstream(_) => "upstream unavailable".to_string(),
        other => other.to_string(),
    };
    (status, Json(json!({ "code": code.as_str(), "msg": msg }))).into_response()
}
