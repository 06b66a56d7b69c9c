//! Security primitives for Switchboard
//!
//! Two concerns live here: the symmetric secrets provider that keeps server
//! `args`/`env` encrypted at rest (with the migration adapter for legacy
//! plaintext rows), and the HS256 bearer-token service used by the HTTP
//! auth hook.

pub mod fields;
pub mod provider;
pub mod token;

pub use fields::{open_args, open_env, seal_args, seal_env};
pub use provider::ChaChaSecretsProvider;
pub use token::{Claims, TokenService};
