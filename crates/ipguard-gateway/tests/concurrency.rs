#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use ipguard_core::{ClientId, ManualClock, SystemClock};
use ipguard_gateway::{
    audit::{AuditEvent, Auditor},
    config::PolicySection,
    obs::metrics::GatewayMetrics,
    policy::{AbuseTracker, BanStore, PolicyEngine},
    transport::IpExtractor,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reports_are_all_counted() {
    let tracker = Arc::new(AbuseTracker::new(Duration::from_secs(900), Arc::new(SystemClock)));
    let ip = ClientId::parse("203.0.113.5").unwrap();

    let tasks = (0..200).map(|_| {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move { tracker.record_invalid_query(ip) })
    });
    let mut seen: Vec<u32> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(tracker.current_count(ip), 200);
    seen.sort_unstable();
    assert_eq!(seen, (1..=200).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_threshold_crossing_bans_once() {
    let clock = Arc::new(ManualClock::new());
    let policy = PolicySection { invalid_threshold: 5, ..PolicySection::default() };
    let metrics = Arc::new(GatewayMetrics::default());
    let (auditor, mut events) = Auditor::channel(1024, Arc::clone(&metrics));
    let engine = Arc::new(PolicyEngine::new(
        &policy,
        IpExtractor::new(Vec::new(), 0),
        Arc::new(AbuseTracker::new(policy.window(), clock.clone())),
        Arc::new(BanStore::new(clock)),
        auditor,
        metrics,
        false,
    ));
    let ip = ClientId::parse("203.0.113.5").unwrap();

    let tasks = (0..40).map(|_| {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.report_invalid_query(ip, "bad", "r").banned })
    });
    let bans = join_all(tasks).await.into_iter().filter(|r| *r.as_ref().unwrap()).count();
    assert_eq!(bans, 1);
    assert!(engine.bans().is_banned(ip));
    assert_eq!(engine.tracker().current_count(ip), 40);

    let mut new_bans = 0;
    while let Ok(ev) = events.try_recv() {
        if matches!(ev, AuditEvent::NewBan { .. }) {
            new_bans += 1;
        }
    }
    assert_eq!(new_bans, 1);
}
