//! Bounded audit queue and its delivery worker.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    Notify,
};
use tokio::task::JoinHandle;

use ipguard_core::ClientId;

use super::{AuditError, AuditEvent, AuditSink};
use crate::obs::metrics::GatewayMetrics;

tokio::task_local! {
    static IN_AUDIT_WORKER: ();
}

/// True while running inside the delivery worker. The panic hook uses it to
/// avoid reporting a sink panic back into the sink.
pub fn in_audit_worker() -> bool {
    IN_AUDIT_WORKER.try_with(|_| ()).is_ok()
}

/// Cloneable, non-blocking front of the audit queue.
#[derive(Clone)]
pub struct Auditor {
    tx: mpsc::Sender<AuditEvent>,
    metrics: Arc<GatewayMetrics>,
}

impl Auditor {
    /// Handle plus the raw receiving end, for callers that drive delivery
    /// themselves.
    pub fn channel(
        capacity: usize,
        metrics: Arc<GatewayMetrics>,
    ) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, metrics }, rx)
    }

    pub fn notify_route_access(&self, identifier: ClientId, route: &str) {
        self.enqueue(AuditEvent::RouteAccess { identifier, route: route.to_string() });
    }

    pub fn notify_blocked_access(&self, identifier: ClientId, route: &str) {
        self.enqueue(AuditEvent::BlockedAccess { identifier, route: route.to_string() });
    }

    pub fn notify_valid_query(&self, identifier: ClientId, value: &str) {
        self.enqueue(AuditEvent::ValidQuery { identifier, value: value.to_string() });
    }

    pub fn notify_invalid_query(&self, identifier: ClientId, value: &str, reason: &str) {
        self.enqueue(AuditEvent::InvalidQuery {
            identifier,
            value: value.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn notify_new_ban(&self, identifier: ClientId, reason: &str) {
        self.enqueue(AuditEvent::NewBan { identifier, reason: reason.to_string() });
    }

    pub fn notify_unhandled_fault(&self, description: &str) {
        self.enqueue(AuditEvent::UnhandledFault { description: description.to_string() });
    }

    /// Never blocks and never fails the caller. A full or closed queue drops
    /// the event, with a local warning.
    fn enqueue(&self, event: AuditEvent) {
        let kind = event.kind();
        let err = match self.tx.try_send(event) {
            Ok(()) => return,
            Err(TrySendError::Full(_)) => AuditError::QueueFull,
            Err(TrySendError::Closed(_)) => AuditError::Closed,
        };
        self.metrics.audit_events.inc(&[("kind", kind), ("result", "dropped")]);
        tracing::warn!(kind, error = %err, "audit event dropped");
    }
}

/// Owner's side of a running delivery worker.
pub struct AuditWorker {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl AuditWorker {
    /// Stop accepting events, deliver what is already queued, and wait up
    /// to `grace` for that to finish. Returns false if the grace ran out.
    pub async fn drain(self, grace: Duration) -> bool {
        self.shutdown.notify_one();
        matches!(tokio::time::timeout(grace, self.handle).await, Ok(Ok(())))
    }
}

/// Start the delivery worker on the current runtime.
pub fn spawn_auditor(
    sink: Arc<dyn AuditSink>,
    capacity: usize,
    metrics: Arc<GatewayMetrics>,
) -> (Auditor, AuditWorker) {
    let (auditor, rx) = Auditor::channel(capacity, Arc::clone(&metrics));
    let shutdown = Arc::new(Notify::new());
    let worker = run_worker(sink, rx, metrics, Arc::clone(&shutdown));
    let handle = tokio::spawn(IN_AUDIT_WORKER.scope((), worker));
    (auditor, AuditWorker { shutdown, handle })
}

async fn run_worker(
    sink: Arc<dyn AuditSink>,
    mut rx: mpsc::Receiver<AuditEvent>,
    metrics: Arc<GatewayMetrics>,
    shutdown: Arc<Notify>,
) {
    tracing::info!(sink = sink.name(), "audit worker started");

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => deliver(sink.as_ref(), &event, &metrics).await,
                None => break,
            },
            _ = shutdown.notified() => {
                rx.close();
                let mut drained = 0usize;
                while let Some(event) = rx.recv().await {
                    deliver(sink.as_ref(), &event, &metrics).await;
                    drained += 1;
                }
                tracing::info!(sink = sink.name(), drained, "audit queue drained");
                break;
            }
        }
    }

    tracing::info!(sink = sink.name(), "audit worker stopped");
}

async fn deliver(sink: &dyn AuditSink, event: &AuditEvent, metrics: &GatewayMetrics) {
    let kind = event.kind();
    // A misbehaving sink must not take the worker down with it.
    let outcome = AssertUnwindSafe(sink.deliver(event)).catch_unwind().await;
    let result = match outcome {
        Ok(Ok(())) => "delivered",
        Ok(Err(e)) => {
            tracing::warn!(sink = sink.name(), kind, error = %e, "audit delivery failed");
            "failed"
        }
        Err(_) => {
            tracing::warn!(sink = sink.name(), kind, "audit sink panicked");
            "failed"
        }
    };
    metrics.audit_events.inc(&[("kind", kind), ("result", result)]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recording(Mutex<Vec<AuditEvent>>);

    #[async_trait]
    impl AuditSink for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }
        async fn deliver(&self, event: &AuditEvent) -> Result<(), AuditError> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl AuditSink for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn deliver(&self, _event: &AuditEvent) -> Result<(), AuditError> {
            Err(AuditError::Status(500))
        }
    }

    fn ip() -> ClientId {
        ClientId::parse("203.0.113.5").unwrap()
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let metrics = Arc::new(GatewayMetrics::default());
        let (auditor, mut rx) = Auditor::channel(2, Arc::clone(&metrics));

        auditor.notify_new_ban(ip(), "a");
        auditor.notify_new_ban(ip(), "b");
        auditor.notify_new_ban(ip(), "c");

        assert_eq!(metrics.audit_events.get(&[("kind", "new_ban"), ("result", "dropped")]), 1);
        assert!(matches!(rx.try_recv(), Ok(AuditEvent::NewBan { reason, .. }) if reason == "a"));
        assert!(matches!(rx.try_recv(), Ok(AuditEvent::NewBan { reason, .. }) if reason == "b"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_queue_is_absorbed() {
        let metrics = Arc::new(GatewayMetrics::default());
        let (auditor, rx) = Auditor::channel(4, Arc::clone(&metrics));
        drop(rx);
        auditor.notify_unhandled_fault("boom");
        assert_eq!(
            metrics.audit_events.get(&[("kind", "unhandled_fault"), ("result", "dropped")]),
            1
        );
    }

    #[tokio::test]
    async fn worker_delivers_in_order() {
        let metrics = Arc::new(GatewayMetrics::default());
        let sink = Arc::new(Recording(Mutex::new(Vec::new())));
        let (auditor, worker) = spawn_auditor(sink.clone(), 16, Arc::clone(&metrics));

        auditor.notify_invalid_query(ip(), "https://x", "not a profile url");
        auditor.notify_new_ban(ip(), "threshold");
        assert!(worker.drain(Duration::from_secs(2)).await);

        let got = sink.0.lock().unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].kind(), "invalid_query");
        assert_eq!(got[1].kind(), "new_ban");
    }

    #[tokio::test]
    async fn worker_survives_failing_sink() {
        let metrics = Arc::new(GatewayMetrics::default());
        let (auditor, worker) = spawn_auditor(Arc::new(Failing), 16, Arc::clone(&metrics));

        auditor.notify_blocked_access(ip(), "/steam-user");
        auditor.notify_blocked_access(ip(), "/steam-user");
        assert!(worker.drain(Duration::from_secs(2)).await);

        assert_eq!(
            metrics.audit_events.get(&[("kind", "blocked_access"), ("result", "failed")]),
            2
        );
    }

    #[tokio::test]
    async fn drain_flushes_queue_and_refuses_late_events() {
        let metrics = Arc::new(GatewayMetrics::default());
        let sink = Arc::new(Recording(Mutex::new(Vec::new())));
        let (auditor, worker) = spawn_auditor(sink.clone(), 16, Arc::clone(&metrics));

        auditor.notify_new_ban(ip(), "threshold");
        auditor.notify_unhandled_fault("boom");
        assert!(worker.drain(Duration::from_secs(2)).await);
        assert_eq!(sink.0.lock().unwrap().len(), 2);

        auditor.notify_new_ban(ip(), "late");
        assert_eq!(metrics.audit_events.get(&[("kind", "new_ban"), ("result", "dropped")]), 1);
        assert_eq!(sink.0.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn drain_outlives_every_sender() {
        let sink = Arc::new(Recording(Mutex::new(Vec::new())));
        let metrics = Arc::new(GatewayMetrics::default());
        let (auditor, worker) = spawn_auditor(sink.clone(), 16, metrics);
        let _kept_elsewhere = auditor.clone();

        auditor.notify_blocked_access(ip(), "/steam-user");
        assert!(worker.drain(Duration::from_secs(2)).await);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }
}
