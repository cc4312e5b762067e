//! Configuration loading
//!
//! Server descriptors live in a JSON settings file under `mcpServers`, keyed by
//! server name. The manager itself only ever sees parsed [`McpServerConfig`]
//! values; reading and writing the file is the job of this module.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::mcp::{McpError, McpResult};

/// Default per-operation timeout for connect, list and call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Default lifetime of a cached tool record
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default maximum number of cached tool records
pub const DEFAULT_MAX_CACHE_SIZE: usize = 1000;

/// Project-local settings file name, searched for from the cwd upwards
const PROJECT_CONFIG_FILE: &str = ".mcp.json";

/// Global settings file name under `<config_dir>/mcp-hub/`
const GLOBAL_CONFIG_FILE: &str = "settings.json";

/// Find a config file by walking up the directory tree.
///
/// Also checks a `hub/` subdirectory at each level so the workspace root
/// finds the crate-local file.
fn find_config_file(filename: &str) -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let candidate = current.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }

        let hub_candidate = current.join("hub").join(filename);
        if hub_candidate.exists() {
            return Some(hub_candidate);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    None
}

/// Path of the global settings file (`~/.config/mcp-hub/settings.json` on Linux)
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mcp-hub").join(GLOBAL_CONFIG_FILE))
}

// ============================================================================
// Transport descriptors
// ============================================================================

/// The closed set of transports a server can be reached over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransportKind {
    /// Subprocess speaking over stdin/stdout
    #[serde(rename = "stdio")]
    Stdio,
    /// HTTP GET event stream plus POSTed client messages
    #[serde(rename = "sse")]
    Sse,
    /// Streamable HTTP
    #[serde(rename = "streamable-http")]
    StreamableHttp,
    /// WebSocket text frames
    #[serde(rename = "ws")]
    WebSocket,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
            Self::StreamableHttp => "streamable-http",
            Self::WebSocket => "ws",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdio" => Ok(Self::Stdio),
            "sse" => Ok(Self::Sse),
            "streamable-http" | "http" => Ok(Self::StreamableHttp),
            "ws" => Ok(Self::WebSocket),
            other => Err(McpError::UnsupportedTransport(other.to_string())),
        }
    }
}

/// Transport-specific parameters for one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    Sse {
        url: String,
        headers: HashMap<String, String>,
    },
    StreamableHttp {
        url: String,
        headers: HashMap<String, String>,
    },
    WebSocket {
        url: String,
    },
}

impl TransportConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio { .. } => TransportKind::Stdio,
            Self::Sse { .. } => TransportKind::Sse,
            Self::StreamableHttp { .. } => TransportKind::StreamableHttp,
            Self::WebSocket { .. } => TransportKind::WebSocket,
        }
    }
}

/// A single server descriptor (one value of `mcpServers`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawServerConfig", into = "RawServerConfig")]
pub struct McpServerConfig {
    pub transport: TransportConfig,
    /// Informational only; the manager connects disabled servers too
    pub enabled: bool,
    /// Per-server override of the operation timeout
    pub timeout: Option<Duration>,
}

impl McpServerConfig {
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            transport: TransportConfig::Stdio {
                command: command.into(),
                args,
                env: HashMap::new(),
            },
            enabled: true,
            timeout: None,
        }
    }

    pub fn streamable_http(url: impl Into<String>) -> Self {
        Self {
            transport: TransportConfig::StreamableHttp {
                url: url.into(),
                headers: HashMap::new(),
            },
            enabled: true,
            timeout: None,
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// On-disk shape of a descriptor; every kind shares one flat object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawServerConfig {
    #[serde(rename = "type", default = "default_transport")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    headers: HashMap<String, String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
}

fn default_transport() -> String {
    TransportKind::Stdio.as_str().to_string()
}

fn default_enabled() -> bool {
    true
}

impl TryFrom<RawServerConfig> for McpServerConfig {
    type Error = McpError;

    // Missing command/url are left empty here and rejected by the transport
    // factory, so one bad entry does not make the whole file unreadable.
    fn try_from(raw: RawServerConfig) -> Result<Self, Self::Error> {
        let transport = match raw.kind.parse::<TransportKind>()? {
            TransportKind::Stdio => TransportConfig::Stdio {
                command: raw.command.unwrap_or_default(),
                args: raw.args,
                env: raw.env,
            },
            TransportKind::Sse => TransportConfig::Sse {
                url: raw.url.unwrap_or_default(),
                headers: raw.headers,
            },
            TransportKind::StreamableHttp => TransportConfig::StreamableHttp {
                url: raw.url.unwrap_or_default(),
                headers: raw.headers,
            },
            TransportKind::WebSocket => TransportConfig::WebSocket {
                url: raw.url.unwrap_or_default(),
            },
        };

        Ok(Self {
            transport,
            enabled: raw.enabled,
            timeout: raw.timeout.filter(|ms| *ms > 0).map(Duration::from_millis),
        })
    }
}

impl From<McpServerConfig> for RawServerConfig {
    fn from(config: McpServerConfig) -> Self {
        let mut raw = RawServerConfig {
            kind: config.kind().as_str().to_string(),
            enabled: config.enabled,
            timeout: config.timeout.map(|t| t.as_millis() as u64),
            ..Default::default()
        };
        match config.transport {
            TransportConfig::Stdio { command, args, env } => {
                raw.command = Some(command);
                raw.args = args;
                raw.env = env;
            }
            TransportConfig::Sse { url, headers } | TransportConfig::StreamableHttp { url, headers } => {
                raw.url = Some(url);
                raw.headers = headers;
            }
            TransportConfig::WebSocket { url } => {
                raw.url = Some(url);
            }
        }
        raw
    }
}

// ============================================================================
// Manager tunables
// ============================================================================

/// Timeouts and cache bounds for the connection manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Applied when neither the caller nor the descriptor sets a timeout
    pub default_timeout: Duration,
    /// Cached tool records older than this are evicted
    pub cache_ttl: Duration,
    /// Upper bound on cached tool records; oldest are evicted first
    pub max_cache_size: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
        }
    }
}

/// `manager` section of the settings file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManagerSection {
    default_timeout_ms: Option<u64>,
    cache_ttl_ms: Option<u64>,
    max_cache_size: Option<usize>,
}

impl From<ManagerSection> for ManagerConfig {
    fn from(section: ManagerSection) -> Self {
        let defaults = ManagerConfig::default();
        Self {
            default_timeout: section
                .default_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.default_timeout),
            cache_ttl: section
                .cache_ttl_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.cache_ttl),
            max_cache_size: section.max_cache_size.unwrap_or(defaults.max_cache_size),
        }
    }
}

// ============================================================================
// Settings file
// ============================================================================

/// MCP settings (from `.mcp.json` or the global settings file)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpConfig {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
    #[serde(default)]
    manager: ManagerSection,
}

impl McpConfig {
    /// Load MCP settings
    ///
    /// Search order:
    /// 1. Walk up directory tree from cwd looking for .mcp.json
    /// 2. The global settings file
    pub fn load() -> Result<Option<(Self, PathBuf)>> {
        let found = find_config_file(PROJECT_CONFIG_FILE)
            .or_else(|| default_settings_path().filter(|path| path.exists()));

        match found {
            Some(path) => {
                tracing::debug!("Loading MCP config from: {}", path.display());
                let config = Self::load_from_path(&path)?;
                Ok(Some((config, path)))
            }
            None => {
                tracing::debug!("No MCP settings file found");
                Ok(None)
            }
        }
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: McpConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn manager_config(&self) -> ManagerConfig {
        self.manager.clone().into()
    }

    pub fn server(&self, name: &str) -> Option<&McpServerConfig> {
        self.mcp_servers.get(name)
    }
}

/// Read the settings file as an untyped object so unrelated keys survive a rewrite
fn read_settings_object(path: &Path) -> Result<serde_json::Map<String, serde_json::Value>> {
    if !path.exists() {
        return Ok(serde_json::Map::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(serde_json::Map::new());
    }
    match serde_json::from_str::<serde_json::Value>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?
    {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("{} does not contain a JSON object", path.display()),
    }
}

fn write_settings_object(
    path: &Path,
    settings: &serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Insert or replace a server descriptor in the settings file
pub fn add_server_to_file(path: &Path, name: &str, config: &McpServerConfig) -> Result<()> {
    let mut settings = read_settings_object(path)?;
    let servers = settings
        .entry("mcpServers")
        .or_insert_with(|| serde_json::Value::Object(Default::default()));
    let servers = servers
        .as_object_mut()
        .context("mcpServers is not a JSON object")?;
    servers.insert(name.to_string(), serde_json::to_value(config)?);
    write_settings_object(path, &settings)
}

/// Remove a server descriptor from the settings file; returns whether it existed
pub fn remove_server_from_file(path: &Path, name: &str) -> Result<bool> {
    let mut settings = read_settings_object(path)?;
    let removed = settings
        .get_mut("mcpServers")
        .and_then(|servers| servers.as_object_mut())
        .and_then(|servers| servers.remove(name))
        .is_some();
    if removed {
        write_settings_object(path, &settings)?;
    }
    Ok(removed)
}

/// Parse `KEY=VALUE` pairs (for `--env` and `--header`)
///
/// Keys and values are trimmed; an empty value is allowed, an empty key or a
/// missing `=` is not.
pub fn parse_key_value(pairs: &[String]) -> McpResult<HashMap<String, String>> {
    let mut out = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| McpError::Config(format!("expected KEY=VALUE, got '{}'", pair)))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(McpError::Config(format!("missing key in '{}'", pair)));
        }
        out.insert(key.to_string(), value.trim().to_string());
    }
    Ok(out)
}
