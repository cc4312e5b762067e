//! Error types for MCP client operations
//!
//! Every failure the connection manager can surface maps to exactly one
//! variant here. Single-server operations return these directly; batch
//! operations record them per server and only return `AllClientsFailed`
//! when nothing usable came back.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while connecting to or operating MCP servers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum McpError {
    /// A descriptor is missing a required field or carries a malformed one
    #[error("invalid server configuration: {0}")]
    Config(String),

    /// The descriptor names a transport kind this client does not speak
    #[error("Unsupported transport type: {0}")]
    UnsupportedTransport(String),

    /// Opening the channel or the protocol handshake did not finish in time
    #[error("Client connection timeout: server '{server}' did not respond within {timeout:?}")]
    ConnectionTimeout {
        /// Server that timed out
        server: String,
        /// Timeout that was applied
        timeout: Duration,
    },

    /// The transport or the protocol handshake failed
    #[error("Failed to connect to MCP server '{server}': {message}")]
    ConnectionFailed {
        /// Server that failed
        server: String,
        /// Underlying transport or handshake error
        message: String,
    },

    /// An operation needed a live session but the client is disconnected
    #[error("Client '{0}' not connected. Please call connect() first")]
    NotConnected(String),

    /// Listing tools timed out or failed at the I/O level
    #[error("Failed to list tools from '{server}': {message}")]
    ToolListingFailed {
        /// Server whose listing failed
        server: String,
        /// Underlying error
        message: String,
    },

    /// A tool call timed out or failed
    #[error("Tool execution failed: {tool} on '{server}': {message}")]
    ToolExecutionFailed {
        /// Server the call was routed to
        server: String,
        /// Tool that was called
        tool: String,
        /// Underlying error
        message: String,
    },

    /// No connected server owns the requested tool
    #[error("No client found for tool: {0}")]
    NoClientForTool(String),

    /// Closing the session raised; the client is still left disconnected
    #[error("Failed to disconnect from MCP server '{server}': {message}")]
    DisconnectionFailed {
        /// Server that failed to close cleanly
        server: String,
        /// Underlying error
        message: String,
    },

    /// Every connected server failed to list its tools
    #[error("Failed to retrieve tools from all clients: {}", .0.join("; "))]
    AllClientsFailed(Vec<String>),
}

/// Result type alias for MCP client operations
pub type McpResult<T> = Result<T, McpError>;
