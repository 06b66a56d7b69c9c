//! Core contracts for the Switchboard orchestrator
//!
//! This crate defines the entity types and the trait seams the rest of the
//! workspace is written against: repositories (persistence), the secrets
//! provider (args/env at rest), and identity resolution (bearer tokens).
//! Implementations live elsewhere so that the core never depends on a
//! concrete storage engine or crypto backend.

pub mod entities;
pub mod error;
pub mod identity;
pub mod repositories;
pub mod secrets;

pub use entities::{
    CallStatus, LogLevel, McpServer, McpTool, Project, ServerLogEntry, ServerStatus, ToolCallLog,
    ToolPreference, ToolSpec, WorkerConfig,
};
pub use error::{AuthError, StorageError, StorageResult};
pub use identity::{AuthenticatedUser, IdentityResolver};
pub use repositories::{
    LogRepository, PreferenceRepository, ProjectRepository, RepositoryFactory, ServerRepository,
    ToolRepository, WorkerConfigRepository,
};
pub use secrets::{SecretsError, SecretsProvider};
