use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use ipguard_core::{ClientId, GuardError};

use super::{AbuseTracker, BanStore};
use crate::audit::Auditor;
use crate::config::PolicySection;
use crate::context::ClientIdentity;
use crate::obs::metrics::GatewayMetrics;
use crate::transport::IpExtractor;

/// Status for every rejected request, banned or unresolvable alike.
pub const BLOCK_STATUS: StatusCode = StatusCode::FORBIDDEN;

/// Decision for one inbound request.
#[derive(Debug)]
pub enum Admission {
    Admit(ClientId),
    Blocked(ClientId),
    /// Identity could not be resolved. Treated exactly like a block.
    Unresolved(GuardError),
}

/// Result of reporting one invalid query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidQueryOutcome {
    pub count: u32,
    /// This report is the one that tipped the client into a ban.
    pub banned: bool,
}

/// IP governance: composes identity resolution, ban lookup, and abuse
/// counting into admit/block decisions, and reports state changes to the
/// auditor.
///
/// Construct once at startup, then share via Arc.
pub struct PolicyEngine {
    extractor: IpExtractor,
    tracker: Arc<AbuseTracker>,
    bans: Arc<BanStore>,
    auditor: Auditor,
    metrics: Arc<GatewayMetrics>,

    invalid_threshold: u32,
    ban_ttl: Option<Duration>,
    log_access: bool,
}

impl PolicyEngine {
    pub fn new(
        policy: &PolicySection,
        extractor: IpExtractor,
        tracker: Arc<AbuseTracker>,
        bans: Arc<BanStore>,
        auditor: Auditor,
        metrics: Arc<GatewayMetrics>,
        log_access: bool,
    ) -> Self {
        Self {
            extractor,
            tracker,
            bans,
            auditor,
            metrics,
            invalid_threshold: policy.invalid_threshold.max(1),
            ban_ttl: policy.ban_ttl(),
            log_access,
        }
    }

    pub fn tracker(&self) -> &Arc<AbuseTracker> {
        &self.tracker
    }

    pub fn bans(&self) -> &Arc<BanStore> {
        &self.bans
    }

    pub fn auditor(&self) -> &Auditor {
        &self.auditor
    }

    /// Resolve the client and check the ban table. No counters move here.
    pub fn evaluate(&self, peer: Option<SocketAddr>, headers: &HeaderMap) -> Admission {
        let id = match self.extractor.resolve(peer, headers) {
            Ok(id) => id,
            Err(e) => return Admission::Unresolved(e),
        };
        if self.bans.is_banned(id) {
            Admission::Blocked(id)
        } else {
            Admission::Admit(id)
        }
    }

    /// Downstream callback for a semantically invalid query.
    ///
    /// Once the window count reaches the threshold the client is banned,
    /// unless a live ban already exists. The check and the insert share one
    /// shard lock, so concurrent reports ban (and notify) at most once. The
    /// counter keeps running until the window rolls or an admin unbans.
    pub fn report_invalid_query(
        &self,
        id: ClientId,
        value: &str,
        reason: &str,
    ) -> InvalidQueryOutcome {
        self.auditor.notify_invalid_query(id, value, reason);
        self.metrics.invalid_queries.inc(&[]);

        let count = self.tracker.record_invalid_query(id);
        tracing::info!(
            ip = %id,
            count,
            threshold = self.invalid_threshold,
            reason,
            "invalid query"
        );

        if count < self.invalid_threshold {
            return InvalidQueryOutcome { count, banned: false };
        }

        let ban_reason = format!(
            "{} invalid queries within {}s",
            self.invalid_threshold,
            self.tracker.window().as_secs()
        );
        if !self.bans.ban_if_absent(id, &ban_reason, self.ban_ttl) {
            return InvalidQueryOutcome { count, banned: false };
        }

        self.metrics.bans.inc(&[("source", "threshold")]);
        tracing::warn!(ip = %id, reason = %ban_reason, ttl = ?self.ban_ttl, "ip banned");
        self.auditor.notify_new_ban(id, &ban_reason);

        InvalidQueryOutcome { count, banned: true }
    }

    pub fn report_valid_query(&self, id: ClientId, value: &str) {
        self.tracker.record_activity(id);
        self.auditor.notify_valid_query(id, value);
    }

    /// Lift a ban and start the client over. No-op for unknown clients.
    pub fn unban(&self, id: ClientId) -> bool {
        let removed = self.bans.unban(id);
        self.tracker.reset(id);
        if removed {
            self.metrics.unbans.inc(&[]);
            tracing::info!(ip = %id, "ip unbanned");
        }
        removed
    }

    /// Periodic housekeeping: idle counters and expired bans.
    pub fn sweep(&self, record_idle_ttl: Duration) -> (usize, usize) {
        let evicted = self.tracker.evict_idle(record_idle_ttl);
        let expired = self.bans.purge_expired();
        if evicted > 0 || expired > 0 {
            tracing::debug!(evicted, expired, "governance sweep");
        }
        (evicted, expired)
    }
}

/// Governance middleware. Runs before any route logic.
pub async fn guard(
    State(engine): State<Arc<PolicyEngine>>,
    mut req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let route = req.uri().path().to_string();

    match engine.evaluate(peer, req.headers()) {
        Admission::Admit(id) => {
            engine.metrics.policy_decisions.inc(&[("outcome", "admitted")]);
            engine.tracker.record_activity(id);
            if engine.log_access {
                engine.auditor.notify_route_access(id, &route);
            }
            req.extensions_mut().insert(ClientIdentity(id));
            next.run(req).await
        }
        Admission::Blocked(id) => {
            engine.metrics.policy_decisions.inc(&[("outcome", "blocked")]);
            tracing::debug!(ip = %id, route = %route, "request from banned ip rejected");
            engine.auditor.notify_blocked_access(id, &route);
            blocked()
        }
        Admission::Unresolved(e) => {
            engine.metrics.policy_decisions.inc(&[("outcome", "unresolved")]);
            tracing::warn!(error = %e, route = %route, "client address unresolved; denying");
            blocked()
        }
    }
}

fn blocked() -> Response {
    (BLOCK_STATUS, "Forbidden").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditEvent;
    use ipguard_core::ManualClock;
    use ipnet::IpNet;
    use tokio::sync::mpsc;

    struct Fixture {
        clock: Arc<ManualClock>,
        engine: PolicyEngine,
        events: mpsc::Receiver<AuditEvent>,
    }

    fn fixture(threshold: u32, ban_ttl_secs: Option<u64>) -> Fixture {
        let clock = Arc::new(ManualClock::new());
        let policy = PolicySection {
            invalid_threshold: threshold,
            ban_ttl_secs,
            ..PolicySection::default()
        };
        let metrics = Arc::new(GatewayMetrics::default());
        let (auditor, events) = Auditor::channel(256, Arc::clone(&metrics));
        let engine = PolicyEngine::new(
            &policy,
            IpExtractor::new(vec!["198.51.100.9/32".parse::<IpNet>().unwrap()], 0),
            Arc::new(AbuseTracker::new(policy.window(), clock.clone())),
            Arc::new(BanStore::new(clock.clone())),
            auditor,
            metrics,
            false,
        );
        Fixture { clock, engine, events }
    }

    fn drain(rx: &mut mpsc::Receiver<AuditEvent>) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind());
        }
        kinds
    }

    fn peer(s: &str) -> Option<SocketAddr> {
        Some(SocketAddr::new(s.parse().unwrap(), 5555))
    }

    fn id(s: &str) -> ClientId {
        ClientId::parse(s).unwrap()
    }

    fn admission(f: &Fixture, ip: &str) -> Admission {
        f.engine.evaluate(peer(ip), &HeaderMap::new())
    }

    #[test]
    fn threshold_bans_on_the_fifth() {
        let mut f = fixture(5, None);
        let ip = id("203.0.113.5");

        for n in 1..=4 {
            let out = f.engine.report_invalid_query(ip, "bad", "not a profile url");
            assert_eq!(out, InvalidQueryOutcome { count: n, banned: false });
            assert!(matches!(admission(&f, "203.0.113.5"), Admission::Admit(_)));
        }

        let out = f.engine.report_invalid_query(ip, "bad", "not a profile url");
        assert!(out.banned);
        assert!(f.engine.bans().is_banned(ip));
        assert!(matches!(admission(&f, "203.0.113.5"), Admission::Blocked(_)));

        let kinds = drain(&mut f.events);
        assert_eq!(kinds.iter().filter(|k| **k == "invalid_query").count(), 5);
        assert_eq!(kinds.last(), Some(&"new_ban"));
    }

    #[test]
    fn window_expiry_prevents_ban() {
        let f = fixture(3, None);
        let ip = id("203.0.113.5");
        f.engine.report_invalid_query(ip, "bad", "r");
        f.engine.report_invalid_query(ip, "bad", "r");
        f.clock.advance(Duration::from_secs(15 * 60));
        let out = f.engine.report_invalid_query(ip, "bad", "r");
        assert_eq!(out, InvalidQueryOutcome { count: 1, banned: false });
        assert!(!f.engine.bans().is_banned(ip));
    }

    #[test]
    fn ttl_ban_lapses() {
        let f = fixture(1, Some(60));
        let ip = id("203.0.113.5");
        assert!(f.engine.report_invalid_query(ip, "bad", "r").banned);
        f.clock.advance(Duration::from_secs(61));
        assert!(matches!(admission(&f, "203.0.113.5"), Admission::Admit(_)));
    }

    #[test]
    fn reports_past_the_threshold_do_not_reban() {
        let mut f = fixture(5, None);
        let ip = id("203.0.113.5");

        let flags: Vec<bool> = (0..10)
            .map(|_| f.engine.report_invalid_query(ip, "bad", "r").banned)
            .collect();
        assert_eq!(flags, [false, false, false, false, true, false, false, false, false, false]);
        assert_eq!(f.engine.tracker().current_count(ip), 10);

        let kinds = drain(&mut f.events);
        assert_eq!(kinds.iter().filter(|k| **k == "new_ban").count(), 1);
    }

    #[test]
    fn lapsed_ban_returns_on_next_strike_in_window() {
        let f = fixture(2, Some(60));
        let ip = id("203.0.113.5");
        f.engine.report_invalid_query(ip, "bad", "r");
        assert!(f.engine.report_invalid_query(ip, "bad", "r").banned);

        f.clock.advance(Duration::from_secs(61));
        assert!(!f.engine.bans().is_banned(ip));
        assert!(f.engine.report_invalid_query(ip, "bad", "r").banned);
    }

    #[test]
    fn unban_restarts_counting() {
        let f = fixture(2, None);
        let ip = id("203.0.113.5");
        f.engine.report_invalid_query(ip, "bad", "r");
        assert!(f.engine.report_invalid_query(ip, "bad", "r").banned);
        assert!(f.engine.unban(ip));
        assert!(!f.engine.bans().is_banned(ip));
        assert_eq!(f.engine.report_invalid_query(ip, "bad", "r").count, 1);
        assert!(!f.engine.unban(id("192.0.2.200")));
    }

    #[test]
    fn banned_client_behind_trusted_proxy_is_blocked() {
        let f = fixture(1, None);
        f.engine.report_invalid_query(id("203.0.113.5"), "bad", "r");

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "198.51.100.9, 203.0.113.5".parse().unwrap());
        assert!(matches!(f.engine.evaluate(peer("198.51.100.9"), &headers), Admission::Blocked(_)));

        // the same header from a stranger identifies the stranger
        assert!(matches!(f.engine.evaluate(peer("192.0.2.50"), &headers), Admission::Admit(_)));
    }

    #[test]
    fn unresolvable_client_is_not_admitted() {
        let f = fixture(5, None);
        assert!(matches!(
            f.engine.evaluate(None, &HeaderMap::new()),
            Admission::Unresolved(GuardError::MalformedAddress(_))
        ));
    }

    #[test]
    fn sweep_reports_evictions() {
        let f = fixture(1, Some(10));
        f.engine.tracker().record_activity(id("192.0.2.1"));
        f.engine.report_invalid_query(id("192.0.2.2"), "bad", "r");
        f.clock.advance(Duration::from_secs(4000));
        assert_eq!(f.engine.sweep(Duration::from_secs(3600)), (2, 1));
    }

    #[test]
    fn decisions_survive_a_dead_audit_queue() {
        let f = fixture(2, None);
        drop(f.events);
        let ip = id("203.0.113.5");
        f.engine.report_invalid_query(ip, "bad", "r");
        assert!(f.engine.report_invalid_query(ip, "bad", "r").banned);
        assert!(f.engine.bans().is_banned(ip));
    }
}
