//! Multi-transport MCP client hub
//!
//! Keeps connections to any number of MCP servers, merges their tools into a
//! single namespace and routes tool calls to the server that owns them.

pub mod config;
pub mod mcp;
pub mod status;
