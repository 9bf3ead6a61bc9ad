//! ipguard gateway library entry.
//!
//! This crate wires identity resolution, abuse tracking, the ban table, the
//! policy middleware, audit delivery, and the lookup route into one HTTP
//! stack. It is consumed by the binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod audit;
pub mod config;
pub mod context;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod router;
pub mod services;
pub mod transport;
