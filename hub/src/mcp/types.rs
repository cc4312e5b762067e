//! MCP type definitions
//!
//! Shared types used across the connection, the cache and the manager.

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::config::TransportKind;

/// A tool from an MCP server
#[derive(Debug, Clone)]
pub struct ToolRecord {
    /// Server this tool belongs to
    pub server: String,
    /// Tool name as exposed by its server
    pub name: String,
    /// Tool description (empty when the server gave none)
    pub description: String,
    /// Input schema, passed through untouched
    pub input_schema: Value,
    /// When this record was fetched
    pub cached_at: Instant,
}

/// Read-only view of one registered client, for presentation layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub connected: bool,
    pub transport: TransportKind,
    pub failure_count: u32,
}

/// Lifecycle state of a single connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}
