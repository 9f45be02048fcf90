//! WebSocket transport
//!
//! Accepts TCP connections, upgrades them to WebSocket and answers every
//! text frame with exactly one JSON reply. Each connection runs on its own
//! task; connections share nothing but the [`Publisher`].

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use super::handler::handle_client_message;
use super::message::ServerMessage;
use crate::publisher::Publisher;

/// Serve connections from a bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, publisher: Publisher) -> std::io::Result<()> {
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("failed to accept connection: {e}");
                continue;
            }
        };
        let publisher = publisher.clone();
        tokio::spawn(handle_connection(stream, peer, publisher));
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, publisher: Publisher) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, "WebSocket handshake error: {e}");
            return;
        }
    };
    debug!(%peer, "client connected");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    while let Some(frame) = ws_receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(%peer, "connection error: {e}");
                break;
            }
        };

        let reply = match frame {
            WsMessage::Text(text) => handle_client_message(&publisher, text.as_str()),
            WsMessage::Binary(_) => ServerMessage::Error {
                message: "binary frames are not supported".to_string(),
            },
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let encoded = match serde_json::to_string(&reply) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(%peer, "failed to encode reply: {e}");
                continue;
            }
        };
        if let Err(e) = ws_sender.send(WsMessage::Text(encoded.into())).await {
            warn!(%peer, "failed to send reply: {e}");
            break;
        }
    }

    debug!(%peer, "client disconnected");
}
