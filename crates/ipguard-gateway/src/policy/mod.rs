//! IP governance (abuse counting, bans, admit/block decisions).
//!
//! The stores are plain objects handed to the engine at construction, so tests
//! can build isolated instances with their own clock.

pub mod abuse;
pub mod bans;
pub mod engine;
pub mod sweeper;

pub use abuse::AbuseTracker;
pub use bans::{BanEntry, BanStore};
pub use engine::{guard, Admission, InvalidQueryOutcome, PolicyEngine, BLOCK_STATUS};
pub use sweeper::spawn_sweeper;
