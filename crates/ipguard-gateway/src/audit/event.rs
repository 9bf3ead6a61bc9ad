use ipguard_core::ClientId;

/// Something worth telling the operators about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    RouteAccess { identifier: ClientId, route: String },
    BlockedAccess { identifier: ClientId, route: String },
    ValidQuery { identifier: ClientId, value: String },
    InvalidQuery { identifier: ClientId, value: String, reason: String },
    NewBan { identifier: ClientId, reason: String },
    UnhandledFault { description: String },
}

impl AuditEvent {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::RouteAccess { .. } => "route_access",
            AuditEvent::BlockedAccess { .. } => "blocked_access",
            AuditEvent::ValidQuery { .. } => "valid_query",
            AuditEvent::InvalidQuery { .. } => "invalid_query",
            AuditEvent::NewBan { .. } => "new_ban",
            AuditEvent::UnhandledFault { .. } => "unhandled_fault",
        }
    }

    pub fn identifier(&self) -> Option<ClientId> {
        match self {
            AuditEvent::RouteAccess { identifier, .. }
            | AuditEvent::BlockedAccess { identifier, .. }
            | AuditEvent::ValidQuery { identifier, .. }
            | AuditEvent::InvalidQuery { identifier, .. }
            | AuditEvent::NewBan { identifier, .. } => Some(*identifier),
            AuditEvent::UnhandledFault { .. } => None,
        }
    }
}
