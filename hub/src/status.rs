//! Server status rows for `mcp list`

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::config::{McpServerConfig, TransportKind};
use crate::mcp::McpClientManager;

/// Placeholder shown in the tools column when no count is available
pub const NO_TOOLS: &str = "—";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServerStatus {
    Connected,
    Error,
    Disabled,
    NotConnected,
}

impl ServerStatus {
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Connected => "✓",
            Self::Error => "✖",
            Self::Disabled => "⚠",
            Self::NotConnected => "•",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connected => "Connected",
            Self::Error => "Error",
            Self::Disabled => "Disabled",
            Self::NotConnected => "Not connected",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRow {
    pub name: String,
    pub transport: TransportKind,
    pub status: ServerStatus,
    /// Tool count, `"tools error"`, or [`NO_TOOLS`]
    pub tools: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub connected: usize,
    pub failed: usize,
    pub disabled: usize,
    pub total: usize,
}

/// One row per configured server, in name order
pub async fn collect_rows(
    servers: &BTreeMap<String, McpServerConfig>,
    manager: &McpClientManager,
) -> Vec<StatusRow> {
    let failed = manager.get_failed_connections().await;
    let clients = manager.get_clients().await;

    let mut rows = Vec::with_capacity(servers.len());
    for (name, config) in servers {
        let error = failed.get(name).cloned();
        let connected = clients.get(name).is_some_and(|info| info.connected);

        let status = if !config.enabled {
            ServerStatus::Disabled
        } else if error.is_some() {
            ServerStatus::Error
        } else if connected {
            ServerStatus::Connected
        } else {
            ServerStatus::NotConnected
        };

        let mut tools = NO_TOOLS.to_string();
        if config.enabled && connected {
            if let Some(client) = manager.get_client(name).await {
                tools = match client.get_tools().await {
                    Ok(list) => list.len().to_string(),
                    Err(_) => "tools error".to_string(),
                };
            }
        }

        rows.push(StatusRow {
            name: name.clone(),
            transport: config.kind(),
            status,
            tools,
            error,
        });
    }
    rows
}

pub fn summarize(rows: &[StatusRow]) -> StatusSummary {
    let mut summary = StatusSummary {
        total: rows.len(),
        ..Default::default()
    };
    for row in rows {
        match row.status {
            ServerStatus::Connected => summary.connected += 1,
            ServerStatus::Error => summary.failed += 1,
            ServerStatus::Disabled => summary.disabled += 1,
            ServerStatus::NotConnected => {}
        }
    }
    summary
}
