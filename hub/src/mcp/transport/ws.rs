//! WebSocket client transport
//!
//! Each JSON-RPC message travels as one text frame.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::transport::Transport;
use rmcp::RoleClient;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors raised by the WebSocket transport
#[derive(Debug, thiserror::Error)]
pub enum WsTransportError {
    #[error("WebSocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct WebSocketTransport {
    sink: Arc<Mutex<SplitSink<Socket, Message>>>,
    stream: SplitStream<Socket>,
}

impl WebSocketTransport {
    pub async fn connect(url: Url) -> Result<Self, WsTransportError> {
        let (socket, _) = connect_async(url.as_str()).await?;
        let (sink, stream) = socket.split();
        Ok(Self {
            sink: Arc::new(Mutex::new(sink)),
            stream,
        })
    }
}

impl Transport<RoleClient> for WebSocketTransport {
    type Error = WsTransportError;

    fn send(
        &mut self,
        item: ClientJsonRpcMessage,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send + 'static {
        let sink = self.sink.clone();
        async move {
            let text = serde_json::to_string(&item)?;
            sink.lock().await.send(Message::Text(text.into())).await?;
            Ok(())
        }
    }

    async fn receive(&mut self) -> Option<ServerJsonRpcMessage> {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerJsonRpcMessage>(&text) {
                    Ok(message) => return Some(message),
                    Err(e) => tracing::warn!("Invalid JSON-RPC message in WebSocket frame: {}", e),
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("WebSocket read failed: {}", e);
                    return None;
                }
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await?;
        Ok(())
    }
}
