//! HTTP+SSE client transport
//!
//! The server keeps a `GET` event stream open. Its first `endpoint` event names
//! the URL that client messages are POSTed to; every later `message` event
//! carries one JSON-RPC message from the server.

use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, ACCEPT};
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::transport::Transport;
use rmcp::RoleClient;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;

/// Buffered server messages not yet taken by the session
const CHANNEL_CAPACITY: usize = 64;

/// Errors raised by the SSE transport
#[derive(Debug, thiserror::Error)]
pub enum SseTransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        source: url::ParseError,
    },

    #[error("event stream closed before the server announced its message endpoint")]
    NoEndpoint,
}

/// One parsed server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Parse one event block (the text between two blank lines)
pub(crate) fn parse_event(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    if data.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data.join("\n"),
    })
}

/// Aborts the stream reader when the transport (or a half-built one) is dropped
struct ReaderGuard(JoinHandle<()>);

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct SseTransport {
    client: reqwest::Client,
    endpoint: Url,
    incoming: mpsc::Receiver<ServerJsonRpcMessage>,
    reader: ReaderGuard,
}

impl SseTransport {
    /// Open the event stream and wait for the message endpoint
    pub async fn connect(url: Url, headers: HeaderMap) -> Result<Self, SseTransportError> {
        let client = reqwest::Client::builder().default_headers(headers).build()?;

        let response = client
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;

        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let (message_tx, incoming) = mpsc::channel(CHANNEL_CAPACITY);
        let reader = ReaderGuard(tokio::spawn(read_events(
            response.bytes_stream(),
            url,
            endpoint_tx,
            message_tx,
        )));

        let endpoint = await_endpoint(endpoint_rx).await?;
        tracing::debug!(endpoint = %endpoint, "SSE message endpoint announced");

        Ok(Self {
            client,
            endpoint,
            incoming,
            reader,
        })
    }
}

/// Byte buffer that yields complete event blocks
///
/// Blocks end at a blank line (`\n\n` or `\r\n\r\n`). Bytes are only decoded
/// once a whole block is present, so a character or delimiter split across
/// network chunks survives.
#[derive(Debug, Default)]
pub(crate) struct EventBuffer {
    bytes: Vec<u8>,
}

impl EventBuffer {
    pub fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Next complete block, without its delimiter
    pub fn next_block(&mut self) -> Option<Result<String, std::string::FromUtf8Error>> {
        let (end, delimiter) = find_delimiter(&self.bytes)?;
        let mut block: Vec<u8> = self.bytes.drain(..end + delimiter).collect();
        block.truncate(end);
        Some(String::from_utf8(block))
    }
}

fn find_delimiter(bytes: &[u8]) -> Option<(usize, usize)> {
    (0..bytes.len()).find_map(|i| {
        let rest = &bytes[i..];
        if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else {
            None
        }
    })
}

/// Wait for the reader to announce the message endpoint
async fn await_endpoint(
    endpoint_rx: oneshot::Receiver<Result<Url, SseTransportError>>,
) -> Result<Url, SseTransportError> {
    endpoint_rx.await.map_err(|_| SseTransportError::NoEndpoint)?
}

async fn read_events<S, B, E>(
    body: S,
    base: Url,
    endpoint_tx: oneshot::Sender<Result<Url, SseTransportError>>,
    message_tx: mpsc::Sender<ServerJsonRpcMessage>,
) where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut endpoint_tx = Some(endpoint_tx);
    let mut body = std::pin::pin!(body);
    let mut buffer = EventBuffer::default();

    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => buffer.push(bytes.as_ref()),
            Err(e) => {
                tracing::warn!("Error reading SSE stream: {}", e);
                break;
            }
        }

        while let Some(block) = buffer.next_block() {
            let block = match block {
                Ok(block) => block,
                Err(e) => {
                    tracing::warn!("Dropping SSE event that is not valid UTF-8: {}", e);
                    continue;
                }
            };
            let Some(event) = parse_event(&block) else {
                continue;
            };

            match event.event.as_deref() {
                Some("endpoint") => {
                    let resolved = base.join(&event.data).map_err(|source| {
                        SseTransportError::InvalidEndpoint {
                            endpoint: event.data.clone(),
                            source,
                        }
                    });
                    if let Some(tx) = endpoint_tx.take() {
                        let _ = tx.send(resolved);
                    }
                }
                None | Some("message") => {
                    match serde_json::from_str::<ServerJsonRpcMessage>(&event.data) {
                        Ok(message) => {
                            if message_tx.send(message).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => tracing::warn!("Invalid JSON-RPC message in SSE event: {}", e),
                    }
                }
                Some(other) => tracing::debug!("Ignoring SSE event: {}", other),
            }
        }
    }

    tracing::debug!("SSE stream ended");
}

impl Transport<RoleClient> for SseTransport {
    type Error = SseTransportError;

    fn send(
        &mut self,
        item: ClientJsonRpcMessage,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send + 'static {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        async move {
            client
                .post(endpoint)
                .json(&item)
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        }
    }

    async fn receive(&mut self) -> Option<ServerJsonRpcMessage> {
        self.incoming.recv().await
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.reader.0.abort();
        self.incoming.close();
        Ok(())
    }
}
