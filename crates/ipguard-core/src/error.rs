//! Shared error type across ipguard crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid input / malformed request.
    BadRequest,
    /// Query failed semantic validation.
    InvalidQuery,
    /// Client address unresolvable, or the client is banned.
    Forbidden,
    /// Admin credentials missing or wrong.
    Unauthorized,
    /// Upstream API failed or answered garbage.
    BadGateway,
    /// Unsupported config version.
    UnsupportedVersion,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::InvalidQuery => "INVALID_QUERY",
            ClientCode::Forbidden => "FORBIDDEN",
            ClientCode::Unauthorized => "UNAUTHORIZED",
            ClientCode::BadGateway => "BAD_GATEWAY",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Internal => "INTERNAL",
        }
    }

    /// HTTP status carried by responses with this code.
    pub fn http_status(self) -> u16 {
        match self {
            ClientCode::BadRequest | ClientCode::InvalidQuery => 400,
            ClientCode::Unauthorized => 401,
            ClientCode::Forbidden => 403,
            ClientCode::BadGateway => 502,
            ClientCode::UnsupportedVersion | ClientCode::Internal => 500,
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, GuardError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum GuardError {
    /// No usable client address could be derived. Callers deny.
    #[error("malformed address: {0}")]
    MalformedAddress(String),
    /// Semantic validation failure on a proxied query.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("upstream: {0}")]
    Upstream(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl GuardError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            GuardError::MalformedAddress(_) => ClientCode::Forbidden,
            GuardError::InvalidQuery(_) => ClientCode::InvalidQuery,
            GuardError::BadRequest(_) => ClientCode::BadRequest,
            GuardError::Unauthorized(_) => ClientCode::Unauthorized,
            GuardError::Upstream(_) => ClientCode::BadGateway,
            GuardError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            GuardError::Internal(_) => ClientCode::Internal,
        }
    }
}
