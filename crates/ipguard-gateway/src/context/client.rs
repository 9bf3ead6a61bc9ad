use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

use ipguard_core::ClientId;

/// Canonical client of an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIdentity(pub ClientId);

impl ClientIdentity {
    pub fn id(&self) -> ClientId {
        self.0
    }
}

/// Handlers mounted outside the governance middleware never see an identity;
/// they get the same answer a blocked client would.
#[async_trait]
impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ClientIdentity>()
            .copied()
            .ok_or((StatusCode::FORBIDDEN, "Forbidden"))
    }
}
