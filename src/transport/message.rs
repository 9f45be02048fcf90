use serde::{Deserialize, Serialize};

/// Requests accepted on the WebSocket endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "publish")]
    Publish {
        #[serde(alias = "conteudo")]
        content: String,
        #[serde(alias = "remetente")]
        sender: String,
        #[serde(alias = "prioridade", default, skip_serializing_if = "Option::is_none")]
        priority: Option<String>,
    },
    #[serde(rename = "health")]
    Health,
}

/// Replies, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "status")]
pub enum ServerMessage {
    #[serde(rename = "ENVIADA")]
    Sent {
        #[serde(rename = "mensagem")]
        message: String,
        id: String,
    },
    #[serde(rename = "UP")]
    Up { service: String },
    #[serde(rename = "ERRO")]
    Error {
        #[serde(rename = "mensagem")]
        message: String,
    },
}
