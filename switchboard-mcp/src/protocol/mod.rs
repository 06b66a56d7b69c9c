//! JSON-RPC 2.0 framing and MCP message types

pub mod jsonrpc;
pub mod messages;

pub use jsonrpc::{JsonRpcError, JsonRpcErrorCode, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
pub use messages::{
    ClientInfo, InitializeResult, ServerCapabilities, ServerInfo, Tool, ToolContent,
    ToolsCallParams, ToolsCallResult, ToolsListResult,
};
