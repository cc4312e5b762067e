//! Protocol sessions
//!
//! The connection layer talks to servers through [`McpSession`], an opaque
//! handle over an initialized MCP session. [`SessionConnector`] opens one for
//! a descriptor; the default [`TransportConnector`] builds the channel with
//! the transport factory and runs the rmcp client handshake over it.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use rmcp::model::CallToolRequestParam;
use rmcp::service::{Peer, RunningService};
use rmcp::{RoleClient, ServiceExt};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::error::{McpError, McpResult};
use super::transport::{create_transport, Channel};
use crate::config::McpServerConfig;

/// A tool as listed by a server, before it is stamped into a cache record
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// An initialized session with one MCP server
#[async_trait]
pub trait McpSession: Send + Sync {
    /// List every tool the server exposes (all pages)
    async fn list_tools(&self) -> Result<Vec<RemoteTool>>;

    /// Call a tool; the result is returned as the server sent it
    async fn call_tool(&self, name: &str, arguments: Option<Map<String, Value>>) -> Result<Value>;

    /// Close the session and release its channel. Calling it again is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Opens sessions for server descriptors
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, name: &str, config: &McpServerConfig) -> McpResult<Arc<dyn McpSession>>;
}

/// Session backed by an rmcp client service
pub struct RmcpSession {
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl RmcpSession {
    pub fn new(service: RunningService<RoleClient, ()>) -> Self {
        Self {
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
        }
    }
}

#[async_trait]
impl McpSession for RmcpSession {
    async fn list_tools(&self) -> Result<Vec<RemoteTool>> {
        let tools = self.peer.list_all_tools().await?;
        Ok(tools
            .into_iter()
            .map(|t| RemoteTool {
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()),
                input_schema: Value::Object((*t.input_schema).clone()),
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Option<Map<String, Value>>) -> Result<Value> {
        let result = self
            .peer
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments,
                task: None,
            })
            .await?;
        Ok(serde_json::to_value(result)?)
    }

    async fn close(&self) -> Result<()> {
        let Some(service) = self.service.lock().await.take() else {
            return Ok(());
        };
        service.cancel().await?;
        Ok(())
    }
}

/// Default connector: transport factory plus rmcp handshake
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportConnector;

#[async_trait]
impl SessionConnector for TransportConnector {
    async fn connect(&self, name: &str, config: &McpServerConfig) -> McpResult<Arc<dyn McpSession>> {
        let channel = create_transport(name, config).await?;
        let kind = channel.kind();

        let service = match channel {
            Channel::Stdio(transport) => ().serve(transport).await,
            Channel::Sse(transport) => ().serve(transport).await,
            Channel::StreamableHttp(transport) => ().serve(transport).await,
            Channel::WebSocket(transport) => ().serve(transport).await,
        }
        .map_err(|e| McpError::ConnectionFailed {
            server: name.to_string(),
            message: format!("handshake failed: {}", e),
        })?;

        tracing::debug!(server = %name, transport = %kind, "MCP session initialized");
        Ok(Arc::new(RmcpSession::new(service)))
    }
}
