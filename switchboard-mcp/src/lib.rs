//! # Switchboard MCP core
//!
//! The stateful heart of the orchestrator: line-framed JSON-RPC to stdio
//! child processes, per-session SSE transports with their message queues,
//! the registries tying the two together, and the unified facade that lets
//! one session front many servers.
//!
//! ```text
//! ┌────────────┐   SSE / POST   ┌─────────────────┐   stdio lines   ┌───────────┐
//! │ MCP client │ ─────────────► │ SessionTransport │ ─────────────► │ child MCP │
//! │ (IDE/agent)│ ◄───────────── │  + handler/K     │ ◄───────────── │  servers  │
//! └────────────┘                └─────────────────┘                 └───────────┘
//! ```

pub mod error;
pub mod filter;
pub mod handler;
pub mod health;
pub mod metrics;
pub mod namespace;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod stderr;
pub mod transport;
pub mod unified;

pub use error::{ErrorKind, McpError, McpResult};
pub use filter::filter_tools;
pub use handler::{PostOutcome, SessionHandler};
pub use health::{ServerHealth, ServerHealthStatus};
pub use metrics::{McpMetrics, MetricsSnapshot};
pub use namespace::{NamespaceRegistry, ParsedToolName};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, Tool};
pub use registry::{ClientKey, ClientRegistry, SessionRegistry};
pub use session::{SessionConfig, SessionTransport};
pub use transport::stdio::{ChildClient, ChildSpec};
pub use unified::UnifiedSession;

/// MCP protocol version spoken to child servers and clients
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Name reported in `serverInfo` and `clientInfo`
pub const ORCHESTRATOR_NAME: &str = "switchboard";

/// Version reported in `serverInfo` and `clientInfo`
pub const ORCHESTRATOR_VERSION: &str = env!("CARGO_PKG_VERSION");
