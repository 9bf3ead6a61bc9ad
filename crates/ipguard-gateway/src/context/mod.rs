//! Per-request context shared across layers.
//!
//! The governance middleware stamps the resolved client onto each admitted
//! request so route handlers can report back without re-resolving it.

pub mod client;

pub use client::ClientIdentity;
