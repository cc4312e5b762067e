//! In-memory MCP servers for driving the manager without real transports

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use mcp_hub::config::McpServerConfig;
use mcp_hub::mcp::{McpError, McpResult, McpSession, RemoteTool, SessionConnector};
use serde_json::{json, Map, Value};

/// One fake server: its tools, failure switches and call counters
#[derive(Default)]
pub struct FakeServer {
    pub tools: Vec<String>,
    pub connect_delay: Option<Duration>,
    /// Delay applied to the first listing only
    pub first_list_delay: Option<Duration>,
    pub fail_connect: AtomicBool,
    pub fail_list: AtomicBool,
    pub connects: AtomicUsize,
    pub lists: AtomicUsize,
    pub calls: AtomicUsize,
    pub closes: AtomicUsize,
    pub last_call: std::sync::Mutex<Option<String>>,
}

impl FakeServer {
    pub fn with_tools(tools: &[&str]) -> Self {
        Self {
            tools: tools.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        let server = Self::default();
        server.fail_connect.store(true, Ordering::SeqCst);
        server
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

struct FakeSession {
    server: Arc<FakeServer>,
}

#[async_trait]
impl McpSession for FakeSession {
    async fn list_tools(&self) -> anyhow::Result<Vec<RemoteTool>> {
        let previous = self.server.lists.fetch_add(1, Ordering::SeqCst);
        if let (0, Some(delay)) = (previous, self.server.first_list_delay) {
            tokio::time::sleep(delay).await;
        }
        if self.server.fail_list.load(Ordering::SeqCst) {
            return Err(anyhow!("listing broke"));
        }
        Ok(self
            .server
            .tools
            .iter()
            .map(|name| RemoteTool {
                name: name.clone(),
                description: Some(format!("{} tool", name)),
                input_schema: json!({ "type": "object" }),
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Option<Map<String, Value>>) -> anyhow::Result<Value> {
        self.server.calls.fetch_add(1, Ordering::SeqCst);
        *self.server.last_call.lock().unwrap() = Some(name.to_string());
        Ok(json!({ "tool": name, "arguments": arguments }))
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.server.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector that hands out sessions to the registered fake servers
#[derive(Default)]
pub struct FakeConnector {
    servers: HashMap<String, Arc<FakeServer>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(mut self, name: &str, server: FakeServer) -> Self {
        self.servers.insert(name.to_string(), Arc::new(server));
        self
    }

    pub fn get(&self, name: &str) -> Arc<FakeServer> {
        self.servers[name].clone()
    }
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn connect(&self, name: &str, _config: &McpServerConfig) -> McpResult<Arc<dyn McpSession>> {
        let server = self.servers.get(name).cloned().ok_or_else(|| McpError::ConnectionFailed {
            server: name.to_string(),
            message: "no such server".to_string(),
        })?;
        server.connects.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = server.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if server.fail_connect.load(Ordering::SeqCst) {
            return Err(McpError::ConnectionFailed {
                server: name.to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(Arc::new(FakeSession { server }))
    }
}

pub fn descriptor() -> McpServerConfig {
    McpServerConfig::stdio("fake-server", vec![])
}
