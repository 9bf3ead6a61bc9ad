//! Transport metadata helpers.
//!
//! Turns socket peers and proxy headers into the canonical client identifier
//! every other layer keys on.

pub mod client_ip;

pub use client_ip::IpExtractor;
