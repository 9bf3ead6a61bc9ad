//! Background housekeeping for the governance stores.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::PolicyEngine;

/// Periodically evict idle client records and expired bans, off the request
/// path.
pub fn spawn_sweeper(
    engine: Arc<PolicyEngine>,
    every: Duration,
    record_idle_ttl: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick fires immediately; nothing to sweep yet
        tick.tick().await;
        loop {
            tick.tick().await;
            engine.sweep(record_idle_ttl);
        }
    })
}
