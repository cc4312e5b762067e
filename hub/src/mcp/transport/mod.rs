//! Transport factory
//!
//! Turns a server descriptor into an open I/O channel. No protocol handshake
//! happens here; the session layer runs it over the returned [`Channel`].

mod resolve;
mod sse;
mod ws;

use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{ConfigureCommandExt, StreamableHttpClientTransport, TokioChildProcess};
use tokio::process::Command;
use url::Url;

pub use resolve::{merge_environment, resolve_args, resolve_command};
pub use sse::{SseTransport, SseTransportError};
pub use ws::{WebSocketTransport, WsTransportError};

use super::error::{McpError, McpResult};
use crate::config::{McpServerConfig, TransportConfig, TransportKind};

/// An open channel to one server, one variant per transport kind
pub enum Channel {
    Stdio(TokioChildProcess),
    Sse(SseTransport),
    StreamableHttp(StreamableHttpClientTransport<reqwest::Client>),
    WebSocket(WebSocketTransport),
}

impl Channel {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio(_) => TransportKind::Stdio,
            Self::Sse(_) => TransportKind::Sse,
            Self::StreamableHttp(_) => TransportKind::StreamableHttp,
            Self::WebSocket(_) => TransportKind::WebSocket,
        }
    }
}

/// Build the channel for a descriptor
///
/// Fails with [`McpError::Config`] when a required field is missing or
/// malformed and with [`McpError::ConnectionFailed`] when the process cannot
/// be spawned or the remote end refuses the connection.
pub async fn create_transport(name: &str, config: &McpServerConfig) -> McpResult<Channel> {
    match &config.transport {
        TransportConfig::Stdio { command, args, env } => {
            if command.trim().is_empty() {
                return Err(McpError::Config(
                    "Command is required for stdio transport".to_string(),
                ));
            }
            let program = resolve_command(command);
            let args = resolve_args(args);
            let env = merge_environment(env);
            tracing::debug!(server = %name, command = %program, "Spawning MCP server process");

            let transport = TokioChildProcess::new(Command::new(&program).configure(|cmd| {
                cmd.args(&args)
                    .env_clear()
                    .envs(&env)
                    .stderr(std::process::Stdio::inherit());
            }))
            .map_err(|e| connection_failed(name, format!("spawn '{}': {}", program, e)))?;

            Ok(Channel::Stdio(transport))
        }

        TransportConfig::Sse { url, headers } => {
            let url = parse_url(url, "SSE")?;
            let headers = build_headers(headers)?;
            let transport = SseTransport::connect(url, headers)
                .await
                .map_err(|e| connection_failed(name, format!("open SSE stream: {}", e)))?;

            Ok(Channel::Sse(transport))
        }

        TransportConfig::StreamableHttp { url, headers } => {
            let url = parse_url(url, "Streamable HTTP")?;
            let client = reqwest::Client::builder()
                .default_headers(build_headers(headers)?)
                .build()
                .map_err(|e| McpError::Config(format!("build HTTP client: {}", e)))?;
            let cfg = StreamableHttpClientTransportConfig::with_uri(url.as_str());

            Ok(Channel::StreamableHttp(StreamableHttpClientTransport::with_client(
                client, cfg,
            )))
        }

        TransportConfig::WebSocket { url } => {
            let url = parse_url(url, "WebSocket")?;
            let transport = WebSocketTransport::connect(url)
                .await
                .map_err(|e| connection_failed(name, format!("open WebSocket: {}", e)))?;

            Ok(Channel::WebSocket(transport))
        }
    }
}

fn connection_failed(name: &str, message: String) -> McpError {
    McpError::ConnectionFailed {
        server: name.to_string(),
        message,
    }
}

fn parse_url(url: &str, transport: &str) -> McpResult<Url> {
    if url.trim().is_empty() {
        return Err(McpError::Config(format!(
            "URL is required for {} transport",
            transport
        )));
    }
    Url::parse(url).map_err(|e| McpError::Config(format!("invalid URL '{}': {}", url, e)))
}

fn build_headers(headers: &HashMap<String, String>) -> McpResult<HeaderMap> {
    let mut header_map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| McpError::Config(format!("Invalid header name: {}", key)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| McpError::Config(format!("Invalid header value for {}", key)))?;
        header_map.insert(name, value);
    }
    Ok(header_map)
}
