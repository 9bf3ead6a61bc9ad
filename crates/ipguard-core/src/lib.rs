//! ipguard core: transport-agnostic primitives shared by the gateway and
//! its tooling.
//!
//! This crate defines the error surface, the canonical client identifier, and
//! the clock abstraction the governance stores are driven by. It carries no
//! transport or runtime dependencies so the stores can be exercised in plain
//! unit tests with a manual clock.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Every fallible path surfaces as `GuardError`/`Result` so a malformed
//! address never takes the process down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod client;
pub mod clock;
pub mod error;

pub use client::ClientId;
pub use clock::{Clock, ManualClock, SystemClock};

/// Shared result type.
pub use error::{GuardError, Result};
