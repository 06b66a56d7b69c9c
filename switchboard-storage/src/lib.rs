//! In-memory repository backend
//!
//! Implements every repository trait with `RwLock` tables. This is the
//! backend the binary wires by default and the one tests build fixtures
//! on; persistent engines live behind the same traits.

pub mod memory;

pub use memory::InMemoryRepositories;
