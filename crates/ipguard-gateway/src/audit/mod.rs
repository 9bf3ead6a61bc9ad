//! Best-effort audit notifications.
//!
//! The policy engine talks to an [`Auditor`] handle whose `notify_*` calls
//! only enqueue. A background worker owns the [`AuditSink`] and absorbs every
//! delivery failure, so nothing on the request path ever waits on (or fails
//! because of) a webhook.

pub mod discord;
pub mod dispatcher;
pub mod event;
pub mod sinks;

use async_trait::async_trait;
use thiserror::Error;

pub use dispatcher::{in_audit_worker, spawn_auditor, AuditWorker, Auditor};
pub use event::AuditEvent;
pub use sinks::{LogSink, NullSink};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("webhook answered {0}")]
    Status(u16),
    #[error("audit queue full")]
    QueueFull,
    #[error("audit queue closed")]
    Closed,
}

/// Delivery backend for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn deliver(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Report every panic in the process as an `UnhandledFault`, then defer to
/// the previously installed hook. Panics raised by the sink itself are not
/// fed back into it.
pub fn install_panic_hook(auditor: Auditor) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if !in_audit_worker() {
            auditor.notify_unhandled_fault(&info.to_string());
        }
        previous(info);
    }));
}
