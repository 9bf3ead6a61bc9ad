//! Per-client invalid-query counting.
//!
//! Counts only. Escalation to a ban is the policy engine's call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use ipguard_core::{ClientId, Clock};

#[derive(Debug, Clone)]
struct ClientRecord {
    invalid_count: u32,
    window_start: Instant,
    last_seen: Instant,
}

impl ClientRecord {
    fn fresh(now: Instant) -> Self {
        Self { invalid_count: 0, window_start: now, last_seen: now }
    }

    fn roll_if_expired(&mut self, now: Instant, window: Duration) {
        if now.saturating_duration_since(self.window_start) >= window {
            self.invalid_count = 0;
            self.window_start = now;
        }
    }
}

/// Fixed-window invalid-query counters keyed by client.
///
/// Each mutation runs under the DashMap entry guard for its key, so
/// concurrent increments for one client never lose updates while unrelated
/// clients on other shards proceed in parallel.
pub struct AbuseTracker {
    window: Duration,
    clock: Arc<dyn Clock>,
    records: DashMap<ClientId, ClientRecord>,
}

impl AbuseTracker {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { window, clock, records: DashMap::new() }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one invalid query and return the count for the current window.
    pub fn record_invalid_query(&self, id: ClientId) -> u32 {
        let now = self.clock.now();
        let mut rec = self.records.entry(id).or_insert_with(|| ClientRecord::fresh(now));
        rec.roll_if_expired(now, self.window);
        rec.invalid_count = rec.invalid_count.saturating_add(1);
        rec.last_seen = now;
        rec.invalid_count
    }

    pub fn record_activity(&self, id: ClientId) {
        let now = self.clock.now();
        self.records
            .entry(id)
            .and_modify(|rec| rec.last_seen = now)
            .or_insert_with(|| ClientRecord::fresh(now));
    }

    /// Count in the current window; 0 for unknown clients or a lapsed window.
    pub fn current_count(&self, id: ClientId) -> u32 {
        let now = self.clock.now();
        self.records
            .get(&id)
            .filter(|rec| now.saturating_duration_since(rec.window_start) < self.window)
            .map(|rec| rec.invalid_count)
            .unwrap_or(0)
    }

    /// Start the client over with an empty window.
    pub fn reset(&self, id: ClientId) {
        let now = self.clock.now();
        if let Some(mut rec) = self.records.get_mut(&id) {
            rec.invalid_count = 0;
            rec.window_start = now;
        }
    }

    /// Drop records idle for at least `ttl`. Returns how many went.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let now = self.clock.now();
        let before = self.records.len();
        self.records
            .retain(|_, rec| now.saturating_duration_since(rec.last_seen) < ttl);
        before.saturating_sub(self.records.len())
    }

    pub fn tracked(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipguard_core::ManualClock;

    const W: Duration = Duration::from_secs(15 * 60);

    fn setup() -> (Arc<ManualClock>, AbuseTracker) {
        let clock = Arc::new(ManualClock::new());
        let tracker = AbuseTracker::new(W, clock.clone());
        (clock, tracker)
    }

    fn id(s: &str) -> ClientId {
        ClientId::parse(s).unwrap()
    }

    #[test]
    fn counts_within_window() {
        let (_clock, t) = setup();
        let ip = id("203.0.113.5");
        assert_eq!(t.record_invalid_query(ip), 1);
        assert_eq!(t.record_invalid_query(ip), 2);
        assert_eq!(t.record_invalid_query(ip), 3);
        assert_eq!(t.current_count(ip), 3);
    }

    #[test]
    fn window_rolls_over() {
        let (clock, t) = setup();
        let ip = id("203.0.113.5");
        t.record_invalid_query(ip);
        t.record_invalid_query(ip);
        clock.advance(W + Duration::from_secs(1));
        assert_eq!(t.current_count(ip), 0);
        assert_eq!(t.record_invalid_query(ip), 1);
    }

    #[test]
    fn spaced_calls_never_accumulate() {
        let (clock, t) = setup();
        let ip = id("203.0.113.5");
        for _ in 0..10 {
            assert_eq!(t.record_invalid_query(ip), 1);
            clock.advance(W);
        }
    }

    #[test]
    fn activity_does_not_count() {
        let (_clock, t) = setup();
        let ip = id("192.0.2.1");
        t.record_activity(ip);
        t.record_activity(ip);
        assert_eq!(t.current_count(ip), 0);
        assert_eq!(t.tracked(), 1);
    }

    #[test]
    fn reset_clears_count() {
        let (_clock, t) = setup();
        let ip = id("192.0.2.1");
        t.record_invalid_query(ip);
        t.record_invalid_query(ip);
        t.reset(ip);
        assert_eq!(t.current_count(ip), 0);
        assert_eq!(t.record_invalid_query(ip), 1);
    }

    #[test]
    fn evicts_only_idle_records() {
        let (clock, t) = setup();
        let old = id("192.0.2.1");
        let fresh = id("192.0.2.2");
        t.record_activity(old);
        clock.advance(Duration::from_secs(3000));
        t.record_activity(fresh);
        clock.advance(Duration::from_secs(700));

        assert_eq!(t.evict_idle(Duration::from_secs(3600)), 1);
        assert_eq!(t.tracked(), 1);
        assert_eq!(t.current_count(old), 0);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let (_clock, t) = setup();
        let t = Arc::new(t);
        let ip = id("203.0.113.5");
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let t = Arc::clone(&t);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        t.record_invalid_query(ip);
                    }
                })
            })
            .collect();
        for th in threads {
            th.join().unwrap();
        }
        assert_eq!(t.current_count(ip), 2000);
    }
}
