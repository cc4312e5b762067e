//! MCP (Model Context Protocol) client implementation
//!
//! Connects to the servers named in the settings file over stdio, SSE,
//! streamable HTTP or WebSocket and exposes their tools as one namespace.

mod cache;
mod client;
mod error;
mod manager;
pub mod session;
pub mod transport;
mod types;

pub use cache::ToolCache;
pub use client::McpClient;
pub use error::{McpError, McpResult};
pub use manager::McpClientManager;
pub use session::{McpSession, RemoteTool, SessionConnector, TransportConnector};
pub use transport::{create_transport, Channel};
pub use types::{ClientInfo, ConnectionState, ToolRecord};
