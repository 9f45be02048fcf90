use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use tungstenite::protocol::Message as WsMessage;

use crate::transport::{ClientMessage, ServerMessage};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed before a reply arrived")]
    Closed,

    #[error("producer rejected the request: {0}")]
    Rejected(String),

    #[error("unexpected reply: {0:?}")]
    Unexpected(ServerMessage),
}

/// One WebSocket connection to the producer; requests are answered in order.
pub struct ProducerClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl ProducerClient {
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (stream, _response) = connect_async(url).await?;
        debug!(url, "connected to producer");
        Ok(Self { stream })
    }

    /// Submit a message; returns the id the producer assigned to it.
    pub async fn publish(
        &mut self,
        content: &str,
        sender: &str,
        priority: Option<&str>,
    ) -> Result<String, ClientError> {
        let request = ClientMessage::Publish {
            content: content.to_string(),
            sender: sender.to_string(),
            priority: priority.map(str::to_string),
        };
        match self.request(&request).await? {
            ServerMessage::Sent { id, .. } => Ok(id),
            ServerMessage::Error { message } => Err(ClientError::Rejected(message)),
            other => Err(ClientError::Unexpected(other)),
        }
    }

    /// Returns the service name reported as up.
    pub async fn health(&mut self) -> Result<String, ClientError> {
        match self.request(&ClientMessage::Health).await? {
            ServerMessage::Up { service } => Ok(service),
            ServerMessage::Error { message } => Err(ClientError::Rejected(message)),
            other => Err(ClientError::Unexpected(other)),
        }
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.close(None).await?;
        Ok(())
    }

    async fn request(&mut self, request: &ClientMessage) -> Result<ServerMessage, ClientError> {
        let text = serde_json::to_string(request)?;
        self.stream.send(WsMessage::Text(text.into())).await?;

        while let Some(frame) = self.stream.next().await {
            match frame? {
                WsMessage::Text(reply) => return Ok(serde_json::from_str(reply.as_str())?),
                WsMessage::Close(_) => break,
                _ => continue,
            }
        }
        Err(ClientError::Closed)
    }
}
