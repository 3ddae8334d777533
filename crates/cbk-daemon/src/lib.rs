//! cbk-daemon library target.
//!
//! Exposes boot, router and state for integration tests.
//! The binary `main.rs` depends on this library target.

pub mod api_types;
pub mod boot;
pub mod routes;
pub mod state;
