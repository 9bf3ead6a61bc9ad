//! Axum router wiring.
//!
//! Every proxied or admin route, and every unmatched path, sits behind the
//! governance middleware. The liveness/readiness/metrics endpoints do not.

use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{delete, get},
    Router,
};
use tower_http::cors::CorsLayer;

use ipguard_core::error::{GuardError, Result};

use crate::{app_state::AppState, ops, policy, services};

pub fn build_router(state: AppState) -> Result<Router> {
    let mut governed = Router::new().route("/steam-user", get(services::lookup));

    if state.cfg().gateway.admin_key.is_some() {
        let admin = Router::new()
            .route("/admin/bans", get(ops::admin::list_bans))
            .route("/admin/bans/:ip", delete(ops::admin::unban))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                ops::admin::require_admin,
            ));
        governed = governed.merge(admin);
    }

    // The fallback must exist before the layer is applied, or unmatched
    // paths would skip the ban check.
    let governed = governed.fallback(not_found).layer(middleware::from_fn_with_state(
        Arc::clone(state.engine()),
        policy::guard,
    ));

    let ops = Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics));

    let cors_origin = state.cfg().gateway.cors_origin.clone();
    let mut app = governed.merge(ops).with_state(state);

    if let Some(origin) = cors_origin {
        let origin = HeaderValue::from_str(&origin)
            .map_err(|_| GuardError::BadRequest(format!("invalid cors origin: {origin}")))?;
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET]),
        );
    }

    Ok(app)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}
