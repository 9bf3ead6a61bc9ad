//! Local sinks for deployments without webhooks.

use async_trait::async_trait;

use super::{AuditError, AuditEvent, AuditSink};

/// Writes every event as a structured tracing record.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl AuditSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, event: &AuditEvent) -> Result<(), AuditError> {
        match event {
            AuditEvent::RouteAccess { identifier, route } => {
                tracing::info!(target: "audit", ip = %identifier, route = %route, "route access");
            }
            AuditEvent::BlockedAccess { identifier, route } => {
                tracing::warn!(target: "audit", ip = %identifier, route = %route, "blocked access");
            }
            AuditEvent::ValidQuery { identifier, value } => {
                tracing::info!(target: "audit", ip = %identifier, value = %value, "valid query");
            }
            AuditEvent::InvalidQuery { identifier, value, reason } => {
                tracing::warn!(
                    target: "audit",
                    ip = %identifier,
                    value = %value,
                    reason = %reason,
                    "invalid query"
                );
            }
            AuditEvent::NewBan { identifier, reason } => {
                tracing::warn!(
                    target: "audit",
                    ip = %identifier,
                    reason = %reason,
                    "new ip banned"
                );
            }
            AuditEvent::UnhandledFault { description } => {
                tracing::error!(target: "audit", description = %description, "unhandled fault");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl AuditSink for NullSink {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn deliver(&self, _event: &AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}
