//! Shared application state for the ipguard gateway.
//!
//! Builds the governance stores, the policy engine, the audit worker, and the
//! upstream client from config. Startup errors are explicit (Result instead
//! of panic).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ipguard_core::error::{GuardError, Result};
use ipguard_core::{Clock, SystemClock};

use crate::audit::{
    discord::DiscordSink, spawn_auditor, AuditSink, AuditWorker, LogSink, NullSink,
};
use crate::config::{AuditSection, GatewayConfig, SinkKind};
use crate::obs::metrics::GatewayMetrics;
use crate::policy::{AbuseTracker, BanStore, PolicyEngine};
use crate::services::{HttpUpstream, Upstream};
use crate::transport::IpExtractor;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    engine: Arc<PolicyEngine>,
    upstream: Arc<dyn Upstream>,
    metrics: Arc<GatewayMetrics>,
    audit_worker: Mutex<Option<AuditWorker>>,
}

impl AppState {
    /// Production wiring: sink per config, HTTP upstream, wall clock.
    /// Must run inside a tokio runtime (spawns the audit worker).
    pub fn new(cfg: GatewayConfig) -> Result<Self> {
        let sink = build_sink(&cfg.audit)?;
        let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::new(&cfg.upstream)?);
        Self::with_parts(cfg, sink, upstream, Arc::new(SystemClock))
    }

    /// Wiring with injected collaborators (tests, alternative deployments).
    pub fn with_parts(
        cfg: GatewayConfig,
        sink: Arc<dyn AuditSink>,
        upstream: Arc<dyn Upstream>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let metrics = Arc::new(GatewayMetrics::default());
        let extractor = IpExtractor::from_config(&cfg.proxy)?;
        let tracker = Arc::new(AbuseTracker::new(cfg.policy.window(), Arc::clone(&clock)));
        let bans = Arc::new(BanStore::new(clock));

        let (auditor, worker) =
            spawn_auditor(sink, cfg.audit.queue_capacity, Arc::clone(&metrics));

        let engine = Arc::new(PolicyEngine::new(
            &cfg.policy,
            extractor,
            tracker,
            bans,
            auditor,
            Arc::clone(&metrics),
            cfg.audit.log_access,
        ));

        tracing::info!(
            window_secs = cfg.policy.window_secs,
            threshold = cfg.policy.invalid_threshold,
            ban_ttl_secs = ?cfg.policy.ban_ttl_secs,
            trusted_proxies = cfg.proxy.trusted.len(),
            "ip governance ready"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                engine,
                upstream,
                metrics,
                audit_worker: Mutex::new(Some(worker)),
            }),
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn engine(&self) -> &Arc<PolicyEngine> {
        &self.inner.engine
    }

    pub fn upstream(&self) -> &Arc<dyn Upstream> {
        &self.inner.upstream
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.inner.metrics
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    /// Flush queued audit events at shutdown. Only the first call does
    /// anything; later calls return true immediately.
    pub async fn drain_audit(&self, grace: Duration) -> bool {
        let worker = match self.inner.audit_worker.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match worker {
            Some(worker) => worker.drain(grace).await,
            None => true,
        }
    }

    /// Gauges computed on scrape.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        let engine = self.engine();
        vec![
            ("ipguard_clients_tracked", engine.tracker().tracked() as u64),
            ("ipguard_bans_active", engine.bans().list().len() as u64),
        ]
    }
}

fn build_sink(cfg: &AuditSection) -> Result<Arc<dyn AuditSink>> {
    let sink: Arc<dyn AuditSink> = match cfg.sink {
        SinkKind::Discord => Arc::new(
            DiscordSink::new(cfg.webhooks.clone(), cfg.timeout())
                .map_err(|e| GuardError::Internal(format!("discord sink: {e}")))?,
        ),
        SinkKind::Log => Arc::new(LogSink),
        SinkKind::None => Arc::new(NullSink),
    };
    Ok(sink)
}
