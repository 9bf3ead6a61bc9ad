//! In-memory ban table with optional expiry.
//!
//! Process-lifetime only: nothing here survives a restart, and separate
//! instances keep separate tables.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use ipguard_core::{ClientId, Clock};

#[derive(Debug, Clone)]
pub struct BanEntry {
    pub identifier: ClientId,
    pub reason: String,
    pub banned_at: Instant,
    /// None = banned until the process exits.
    pub expires_at: Option<Instant>,
}

impl BanEntry {
    fn expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

pub struct BanStore {
    clock: Arc<dyn Clock>,
    entries: DashMap<ClientId, BanEntry>,
}

impl BanStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, entries: DashMap::new() }
    }

    /// True if a live entry exists. An expired entry found here is removed.
    pub fn is_banned(&self, id: ClientId) -> bool {
        let now = self.clock.now();
        // remove_if holds the shard lock, so a concurrent re-ban with a fresh
        // expiry is never the one that gets dropped.
        if self.entries.remove_if(&id, |_, e| e.expired(now)).is_some() {
            tracing::debug!(ip = %id, "ban expired");
            return false;
        }
        self.entries.contains_key(&id)
    }

    /// Insert or overwrite. Emits nothing; notifying is the caller's job.
    pub fn ban(&self, id: ClientId, reason: &str, ttl: Option<Duration>) {
        let now = self.clock.now();
        self.entries.insert(
            id,
            BanEntry {
                identifier: id,
                reason: reason.to_string(),
                banned_at: now,
                expires_at: ttl.map(|d| now + d),
            },
        );
    }

    /// Insert only if no live entry exists, checked and written under one
    /// shard lock. Returns whether this call created the ban.
    pub fn ban_if_absent(&self, id: ClientId, reason: &str, ttl: Option<Duration>) -> bool {
        let now = self.clock.now();
        let fresh = BanEntry {
            identifier: id,
            reason: reason.to_string(),
            banned_at: now,
            expires_at: ttl.map(|d| now + d),
        };
        match self.entries.entry(id) {
            Entry::Occupied(mut live) if live.get().expired(now) => {
                live.insert(fresh);
                true
            }
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(fresh);
                true
            }
        }
    }

    /// Returns whether an entry was actually removed.
    pub fn unban(&self, id: ClientId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn get(&self, id: ClientId) -> Option<BanEntry> {
        let now = self.clock.now();
        self.entries
            .get(&id)
            .filter(|e| !e.expired(now))
            .map(|e| e.value().clone())
    }

    /// Live entries, most recent first.
    pub fn list(&self) -> Vec<BanEntry> {
        let now = self.clock.now();
        let mut out: Vec<BanEntry> = self
            .entries
            .iter()
            .filter(|e| !e.expired(now))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| b.banned_at.cmp(&a.banned_at));
        out
    }

    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Raw entry count, expired-but-unswept included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Time left on a ban; None for permanent or absent entries.
    pub fn remaining(&self, id: ClientId) -> Option<Duration> {
        let now = self.clock.now();
        self.get(id)?
            .expires_at
            .map(|at| at.saturating_duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipguard_core::ManualClock;

    fn setup() -> (Arc<ManualClock>, BanStore) {
        let clock = Arc::new(ManualClock::new());
        let store = BanStore::new(clock.clone());
        (clock, store)
    }

    fn id(s: &str) -> ClientId {
        ClientId::parse(s).unwrap()
    }

    #[test]
    fn unknown_is_not_banned() {
        let (_c, s) = setup();
        assert!(!s.is_banned(id("192.0.2.1")));
        assert!(s.is_empty());
    }

    #[test]
    fn permanent_ban_sticks_until_unban() {
        let (clock, s) = setup();
        let ip = id("203.0.113.5");
        s.ban(ip, "too many invalid queries", None);
        for _ in 0..100 {
            clock.advance(Duration::from_secs(86_400));
            assert!(s.is_banned(ip));
        }
        assert!(s.unban(ip));
        assert!(!s.is_banned(ip));
    }

    #[test]
    fn expired_ban_is_removed_on_lookup() {
        let (clock, s) = setup();
        let ip = id("203.0.113.5");
        s.ban(ip, "r", Some(Duration::from_secs(60)));
        assert!(s.is_banned(ip));
        assert_eq!(s.remaining(ip), Some(Duration::from_secs(60)));

        clock.advance(Duration::from_secs(60));
        assert!(!s.is_banned(ip));
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn reban_overwrites() {
        let (clock, s) = setup();
        let ip = id("203.0.113.5");
        s.ban(ip, "first", Some(Duration::from_secs(10)));
        s.ban(ip, "second", None);
        clock.advance(Duration::from_secs(11));
        assert!(s.is_banned(ip));
        assert_eq!(s.len(), 1);
        assert_eq!(s.get(ip).unwrap().reason, "second");
    }

    #[test]
    fn ban_if_absent_keeps_the_live_entry() {
        let (clock, s) = setup();
        let ip = id("203.0.113.5");
        assert!(s.ban_if_absent(ip, "first", Some(Duration::from_secs(10))));
        assert!(!s.ban_if_absent(ip, "second", None));
        assert_eq!(s.get(ip).unwrap().reason, "first");

        clock.advance(Duration::from_secs(10));
        assert!(s.ban_if_absent(ip, "third", None));
        assert_eq!(s.get(ip).unwrap().reason, "third");
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn unban_unknown_is_noop() {
        let (_c, s) = setup();
        assert!(!s.unban(id("192.0.2.9")));
    }

    #[test]
    fn purge_drops_only_expired() {
        let (clock, s) = setup();
        s.ban(id("192.0.2.1"), "r", Some(Duration::from_secs(5)));
        s.ban(id("192.0.2.2"), "r", None);
        clock.advance(Duration::from_secs(6));
        assert_eq!(s.purge_expired(), 1);
        let live = s.list();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].identifier, id("192.0.2.2"));
    }
}
