//! MCP client manager
//!
//! Registry of named connections. Aggregates their tools into one
//! collision-free namespace, caches it with TTL and size bounds, tracks
//! per-server failures and routes tool calls to the owning connection.
//!
//! The manager is an ordinary value: the caller builds it, shares it behind
//! an `Arc` and calls [`McpClientManager::disconnect_all`] on shutdown.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use super::cache::ToolCache;
use super::client::McpClient;
use super::error::{McpError, McpResult};
use super::session::{SessionConnector, TransportConnector};
use super::types::{ClientInfo, ToolRecord};
use crate::config::{ManagerConfig, McpServerConfig};

struct ClientEntry {
    client: Arc<McpClient>,
    config: McpServerConfig,
    connected: bool,
    last_seen: Instant,
    failure_count: u32,
}

impl ClientEntry {
    fn new(client: Arc<McpClient>, config: McpServerConfig) -> Self {
        Self {
            client,
            config,
            connected: false,
            last_seen: Instant::now(),
            failure_count: 0,
        }
    }

    /// The flag alone goes stale when the client is disconnected directly
    async fn is_live(&self) -> bool {
        self.connected && self.client.is_connected().await
    }
}

/// Manages connections to multiple MCP servers
pub struct McpClientManager {
    connector: Arc<dyn SessionConnector>,
    config: ManagerConfig,
    /// Ordered by name, so tool discovery order is stable
    clients: RwLock<BTreeMap<String, ClientEntry>>,
    failed_connections: RwLock<HashMap<String, String>>,
    tools: Mutex<ToolCache>,
    /// Held for a whole aggregation pass so passes never interleave
    refresh: Mutex<()>,
}

impl McpClientManager {
    /// Manager that reaches servers over their configured transports
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_connector(Arc::new(TransportConnector), config)
    }

    pub fn with_connector(connector: Arc<dyn SessionConnector>, config: ManagerConfig) -> Self {
        Self {
            connector,
            config,
            clients: RwLock::new(BTreeMap::new()),
            failed_connections: RwLock::new(HashMap::new()),
            tools: Mutex::new(ToolCache::new()),
            refresh: Mutex::new(()),
        }
    }

    /// Register a connection under `name`. An existing registration is kept.
    ///
    /// A later [`add_server`](Self::add_server) for the same name reuses this
    /// client, so a timeout set with [`McpClient::with_timeout`] applies.
    pub async fn register_client(&self, name: &str, client: Arc<McpClient>) {
        let mut clients = self.clients.write().await;
        if clients.contains_key(name) {
            tracing::warn!(server = %name, "Client already registered");
            return;
        }
        let config = client.get_server_config().clone();
        clients.insert(name.to_string(), ClientEntry::new(client, config));
        tracing::info!(server = %name, total = clients.len(), "Client registered");
    }

    /// Register (if new) and connect a server, then refresh the tool cache
    ///
    /// A connect failure is recorded and returned to the caller.
    pub async fn add_server(&self, name: &str, config: McpServerConfig) -> McpResult<()> {
        let client = {
            let mut clients = self.clients.write().await;
            let entry = clients.entry(name.to_string()).or_insert_with(|| {
                let client = McpClient::new(name, config.clone(), self.connector.clone())
                    .with_default_timeout(self.config.default_timeout);
                tracing::info!(server = %name, "Client registered");
                ClientEntry::new(Arc::new(client), config.clone())
            });
            entry.config = config;
            entry.client.clone()
        };

        match client.connect().await {
            Ok(_) => {
                if let Some(entry) = self.clients.write().await.get_mut(name) {
                    entry.connected = true;
                    entry.last_seen = Instant::now();
                    entry.failure_count = 0;
                }
                self.failed_connections.write().await.remove(name);
                self.refresh_tool_cache().await;
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(server = %name, error = %message, "Failed to connect to server");
                self.failed_connections
                    .write()
                    .await
                    .insert(name.to_string(), message);
                if let Some(entry) = self.clients.write().await.get_mut(name) {
                    entry.connected = false;
                    entry.failure_count += 1;
                    entry.last_seen = Instant::now();
                }
                Err(e)
            }
        }
    }

    /// Connect every descriptor concurrently. Failures are recorded, never raised.
    pub async fn initialize_from_config(&self, servers: &BTreeMap<String, McpServerConfig>) {
        let attempts = servers
            .iter()
            .map(|(name, config)| self.add_server(name, config.clone()));
        let outcomes = join_all(attempts).await;

        let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
        tracing::info!(
            total = servers.len(),
            failed,
            "Initialized MCP servers from config"
        );
    }

    /// Aggregate the tools of every connected server
    ///
    /// A tool whose name is already taken is re-keyed as `server.tool`.
    /// Servers that fail to list are recorded and skipped; the call fails
    /// only when there were failures and nothing was listed.
    pub async fn get_all_tools(&self) -> McpResult<BTreeMap<String, ToolRecord>> {
        let _pass = self.refresh.lock().await;
        self.aggregate().await
    }

    async fn aggregate(&self) -> McpResult<BTreeMap<String, ToolRecord>> {
        let mut connected: Vec<(String, Arc<McpClient>)> = Vec::new();
        for (name, entry) in self.clients.read().await.iter() {
            if entry.is_live().await {
                connected.push((name.clone(), entry.client.clone()));
            }
        }

        let listings = join_all(connected.iter().map(|(_, client)| client.get_tools())).await;

        let mut all_tools: BTreeMap<String, ToolRecord> = BTreeMap::new();
        let mut errors = Vec::new();

        for ((name, _), listing) in connected.iter().zip(listings) {
            match listing {
                Ok(tools) => {
                    tracing::debug!(server = %name, count = tools.len(), "Retrieved tools");
                    self.failed_connections.write().await.remove(name);
                    for tool in tools {
                        let key = if all_tools.contains_key(&tool.name) {
                            format!("{}.{}", name, tool.name)
                        } else {
                            tool.name.clone()
                        };
                        if all_tools.contains_key(&key) {
                            tracing::warn!(server = %name, tool = %key, "Duplicate tool name, skipping");
                            continue;
                        }
                        all_tools.insert(key, tool);
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    tracing::error!(server = %name, error = %message, "Failed to get tools");
                    errors.push(format!("{}: {}", name, message));
                    self.record_listing_failure(name, message).await;
                }
            }
        }

        if !errors.is_empty() && all_tools.is_empty() {
            return Err(McpError::AllClientsFailed(errors));
        }

        {
            let mut cache = self.tools.lock().await;
            for (key, record) in &all_tools {
                cache.insert(key.clone(), record.clone());
            }
            let (expired, evicted) =
                cache.prune(Instant::now(), self.config.cache_ttl, self.config.max_cache_size);
            if expired + evicted > 0 {
                tracing::debug!(expired, evicted, remaining = cache.len(), "Pruned tool cache");
            }
        }

        tracing::debug!(count = all_tools.len(), clients = connected.len(), "Retrieved all tools");
        Ok(all_tools)
    }

    /// Connection that owns `tool`, if it is cached and still connected
    pub async fn get_tool_client(&self, tool: &str) -> Option<Arc<McpClient>> {
        self.route(tool).await.map(|(client, _)| client)
    }

    /// Run a tool on its owning server
    ///
    /// An unknown name forces one cache refresh before giving up.
    pub async fn execute_tool(&self, tool: &str, arguments: Option<Map<String, Value>>) -> McpResult<Value> {
        let route = match self.route(tool).await {
            Some(route) => Some(route),
            None => {
                self.refresh_tool_cache().await;
                self.route(tool).await
            }
        };
        let (client, remote_name) = route.ok_or_else(|| McpError::NoClientForTool(tool.to_string()))?;

        let result = client.call_tool(&remote_name, arguments).await?;
        tracing::info!(server = %client.name(), tool = %tool, "Tool executed successfully");
        Ok(result)
    }

    /// Snapshot of every registered client
    pub async fn get_clients(&self) -> BTreeMap<String, ClientInfo> {
        let mut infos = BTreeMap::new();
        for (name, entry) in self.clients.read().await.iter() {
            infos.insert(
                name.clone(),
                ClientInfo {
                    connected: entry.is_live().await,
                    transport: entry.config.kind(),
                    failure_count: entry.failure_count,
                },
            );
        }
        infos
    }

    /// Snapshot of the last error per failing server
    pub async fn get_failed_connections(&self) -> HashMap<String, String> {
        self.failed_connections.read().await.clone()
    }

    pub async fn get_client(&self, name: &str) -> Option<Arc<McpClient>> {
        self.clients
            .read()
            .await
            .get(name)
            .map(|entry| entry.client.clone())
    }

    pub async fn cached_tool_count(&self) -> usize {
        self.tools.lock().await.len()
    }

    /// Disconnect and forget a server. Unknown names are ignored.
    pub async fn remove_client(&self, name: &str) {
        let Some(client) = self.get_client(name).await else {
            tracing::warn!(server = %name, "Client not found for removal");
            return;
        };

        if let Err(e) = client.disconnect().await {
            tracing::warn!(server = %name, error = %e, "Error disconnecting client");
        }

        self.clients.write().await.remove(name);
        let purged = self.tools.lock().await.remove_server(name);
        self.failed_connections.write().await.remove(name);

        tracing::info!(server = %name, purged, "Client removed");
    }

    /// Disconnect every client concurrently, then clear all state
    pub async fn disconnect_all(&self) {
        let clients: Vec<(String, Arc<McpClient>)> = self
            .clients
            .read()
            .await
            .iter()
            .map(|(name, entry)| (name.clone(), entry.client.clone()))
            .collect();

        tracing::info!(count = clients.len(), "Disconnecting all clients");

        join_all(clients.iter().map(|(name, client)| async move {
            if let Err(e) = client.disconnect().await {
                tracing::warn!(server = %name, error = %e, "Error disconnecting client");
            }
        }))
        .await;

        self.clients.write().await.clear();
        self.failed_connections.write().await.clear();
        self.tools.lock().await.clear();

        tracing::info!("All clients disconnected and caches cleared");
    }

    /// Rebuild the tool cache from scratch. Errors are logged, not raised.
    async fn refresh_tool_cache(&self) {
        let _pass = self.refresh.lock().await;
        self.tools.lock().await.clear();
        if let Err(e) = self.aggregate().await {
            tracing::warn!(error = %e, "Tool cache refresh failed");
        }
    }

    /// Owning connection and the tool's name on that server
    async fn route(&self, tool: &str) -> Option<(Arc<McpClient>, String)> {
        let (owner, remote_name) = {
            let cache = self.tools.lock().await;
            let owner = cache.owner(tool)?.to_string();
            let remote_name = cache.get(tool)?.name.clone();
            (owner, remote_name)
        };

        let clients = self.clients.read().await;
        let entry = clients.get(&owner)?;
        if !entry.is_live().await {
            return None;
        }
        Some((entry.client.clone(), remote_name))
    }

    async fn record_listing_failure(&self, name: &str, message: String) {
        self.failed_connections
            .write()
            .await
            .insert(name.to_string(), message);
        if let Some(entry) = self.clients.write().await.get_mut(name) {
            entry.failure_count += 1;
            entry.last_seen = Instant::now();
        }
    }
}
