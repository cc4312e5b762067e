//! A single MCP server connection
//!
//! Owns at most one live session and applies the operation timeout to
//! connect, list and call.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use super::error::{McpError, McpResult};
use super::session::{McpSession, SessionConnector};
use super::types::{ConnectionState, ToolRecord};
use crate::config::{McpServerConfig, TransportKind, DEFAULT_TIMEOUT};

struct Inner {
    state: ConnectionState,
    session: Option<Arc<dyn McpSession>>,
}

/// Connection to one named MCP server
pub struct McpClient {
    name: String,
    config: McpServerConfig,
    connector: Arc<dyn SessionConnector>,
    timeout_override: Option<Duration>,
    default_timeout: Duration,
    /// Serializes connect and disconnect
    lifecycle: Mutex<()>,
    inner: RwLock<Inner>,
}

impl McpClient {
    pub fn new(
        name: impl Into<String>,
        config: McpServerConfig,
        connector: Arc<dyn SessionConnector>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            connector,
            timeout_override: None,
            default_timeout: DEFAULT_TIMEOUT,
            lifecycle: Mutex::new(()),
            inner: RwLock::new(Inner {
                state: ConnectionState::Disconnected,
                session: None,
            }),
        }
    }

    /// Explicit timeout that wins over the descriptor's
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    /// Fallback used when neither an override nor the descriptor sets one
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_server_config(&self) -> &McpServerConfig {
        &self.config
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.config.kind()
    }

    /// Effective operation timeout: override, then descriptor, then default
    pub fn timeout(&self) -> Duration {
        self.timeout_override
            .or(self.config.timeout)
            .unwrap_or(self.default_timeout)
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.read().await.state
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Open the session. Returns the existing one if already connected.
    pub async fn connect(&self) -> McpResult<Arc<dyn McpSession>> {
        let _lifecycle = self.lifecycle.lock().await;

        if let Some(session) = self.live_session().await {
            tracing::warn!(server = %self.name, "Client already connected");
            return Ok(session);
        }

        self.inner.write().await.state = ConnectionState::Connecting;
        let timeout = self.timeout();
        tracing::info!(server = %self.name, transport = %self.transport_kind(), "Connecting to MCP server");

        let outcome = tokio::time::timeout(timeout, self.connector.connect(&self.name, &self.config))
            .await
            .map_err(|_| McpError::ConnectionTimeout {
                server: self.name.clone(),
                timeout,
            })
            .and_then(|result| result);

        let mut inner = self.inner.write().await;
        match outcome {
            Ok(session) => {
                inner.state = ConnectionState::Connected;
                inner.session = Some(session.clone());
                tracing::info!(server = %self.name, "Connected to MCP server");
                Ok(session)
            }
            Err(e) => {
                inner.state = ConnectionState::Disconnected;
                inner.session = None;
                Err(e)
            }
        }
    }

    /// The live session, connecting first if needed
    pub async fn get_connected_client(&self) -> McpResult<Arc<dyn McpSession>> {
        match self.live_session().await {
            Some(session) => Ok(session),
            None => self.connect().await,
        }
    }

    /// Close the session. Local state is cleared even when closing fails.
    pub async fn disconnect(&self) -> McpResult<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let session = {
            let mut inner = self.inner.write().await;
            inner.state = ConnectionState::Disconnected;
            inner.session.take()
        };

        let Some(session) = session else {
            tracing::debug!(server = %self.name, "Disconnect on a disconnected client");
            return Ok(());
        };

        session.close().await.map_err(|e| McpError::DisconnectionFailed {
            server: self.name.clone(),
            message: e.to_string(),
        })?;

        tracing::info!(server = %self.name, "Disconnected from MCP server");
        Ok(())
    }

    /// List the server's tools as cache records stamped with the current time
    pub async fn get_tools(&self) -> McpResult<Vec<ToolRecord>> {
        let session = self.require_session().await?;
        let timeout = self.timeout();

        let tools = tokio::time::timeout(timeout, session.list_tools())
            .await
            .map_err(|_| McpError::ToolListingFailed {
                server: self.name.clone(),
                message: format!("timed out after {:?}", timeout),
            })?
            .map_err(|e| McpError::ToolListingFailed {
                server: self.name.clone(),
                message: e.to_string(),
            })?;

        let now = Instant::now();
        Ok(tools
            .into_iter()
            .map(|tool| ToolRecord {
                server: self.name.clone(),
                name: tool.name,
                description: tool.description.unwrap_or_default(),
                input_schema: tool.input_schema,
                cached_at: now,
            })
            .collect())
    }

    /// Call a tool by the name its server exposes
    pub async fn call_tool(&self, tool: &str, arguments: Option<Map<String, Value>>) -> McpResult<Value> {
        let session = self.require_session().await?;
        let timeout = self.timeout();

        tracing::debug!(server = %self.name, tool = %tool, "Calling MCP tool");
        let failed = |message: String| McpError::ToolExecutionFailed {
            server: self.name.clone(),
            tool: tool.to_string(),
            message,
        };

        tokio::time::timeout(timeout, session.call_tool(tool, arguments))
            .await
            .map_err(|_| failed(format!("timed out after {:?}", timeout)))?
            .map_err(|e| failed(e.to_string()))
    }

    async fn live_session(&self) -> Option<Arc<dyn McpSession>> {
        let inner = self.inner.read().await;
        match inner.state {
            ConnectionState::Connected => inner.session.clone(),
            _ => None,
        }
    }

    async fn require_session(&self) -> McpResult<Arc<dyn McpSession>> {
        self.live_session()
            .await
            .ok_or_else(|| McpError::NotConnected(self.name.clone()))
    }
}
