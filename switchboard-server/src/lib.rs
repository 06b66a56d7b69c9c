//! HTTP surface for the Switchboard MCP orchestrator
//!
//! Routes, auth gating, and the application context tying the core
//! subsystems together. The `switchboard` binary in `main.rs` wires the
//! in-memory storage backend; any [`RepositoryFactory`] implementation
//! slots in the same way.
//!
//! [`RepositoryFactory`]: switchboard_interfaces::RepositoryFactory

pub mod auth;
pub mod bootstrap;
pub mod context;
pub mod janitor;
pub mod routes;
pub mod specs;
pub mod startup;

pub use context::AppContext;
pub use startup::build_router;
