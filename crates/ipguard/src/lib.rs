//! Top-level facade crate for ipguard.
//!
//! Re-exports core types and the gateway library so users can depend on a single crate.

pub mod core {
    pub use ipguard_core::*;
}

pub mod gateway {
    pub use ipguard_gateway::*;
}
