//! Turns one request frame into one reply.

use thiserror::Error;
use tracing::{info, warn};

use super::message::{ClientMessage, ServerMessage};
use crate::publisher::Publisher;

pub const SENT_MESSAGE: &str = "Mensagem publicada com sucesso";
pub const SERVICE_NAME: &str = "Producer";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("content must not be blank")]
    BlankContent,

    #[error("sender must not be blank")]
    BlankSender,
}

pub fn validate_publish(content: &str, sender: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::BlankContent);
    }
    if sender.trim().is_empty() {
        return Err(ValidationError::BlankSender);
    }
    Ok(())
}

/// Handle a text frame. The publish outcome is not awaited; the reply only
/// confirms the message was handed to the broker.
pub fn handle_client_message(publisher: &Publisher, text: &str) -> ServerMessage {
    let request = match serde_json::from_str::<ClientMessage>(text) {
        Ok(request) => request,
        Err(e) => {
            warn!("invalid client message: {e}");
            return ServerMessage::Error {
                message: format!("invalid request: {e}"),
            };
        }
    };

    match request {
        ClientMessage::Publish {
            content,
            sender,
            priority,
        } => {
            if let Err(e) = validate_publish(&content, &sender) {
                warn!(%sender, "rejected publish request: {e}");
                return ServerMessage::Error {
                    message: e.to_string(),
                };
            }

            info!(%content, %sender, topic = publisher.topic(), "publish request received");
            let submission = publisher.publish(&content, &sender, priority.as_deref());
            ServerMessage::Sent {
                message: SENT_MESSAGE.to_string(),
                id: submission.message().id().to_string(),
            }
        }
        ClientMessage::Health => ServerMessage::Up {
            service: SERVICE_NAME.to_string(),
        },
    }
}
