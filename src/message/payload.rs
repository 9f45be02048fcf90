//! Delivered payloads.
//!
//! A delivery's value reaches a listener either as a well-typed message
//! (ISO date-time, canonical field names) or as an untyped JSON object, for
//! example when the producer wrote `dataHora` as a numeric array. `Payload`
//! captures both shapes; [`Payload::into_message`] turns either into a
//! [`Message`].

use serde_json::{Map, Value};
use thiserror::Error;

use super::codec::datetime_from_value;
use super::{FIELD_CONTENT, FIELD_ID, FIELD_PRIORITY, FIELD_SENDER, FIELD_TIMESTAMP, Message};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("payload is a JSON {0}, expected an object")]
    NotAnObject(&'static str),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("field `{field}` is not a valid date-time: {reason}")]
    InvalidDateTime { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Structured(Message),
    Raw(Map<String, Value>),
}

impl Payload {
    /// Decode raw delivery bytes, preferring the typed shape.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if let Ok(message) = serde_json::from_slice::<Message>(bytes) {
            return Ok(Payload::Structured(message));
        }

        match serde_json::from_slice::<Value>(bytes)? {
            Value::Object(fields) => Ok(Payload::Raw(fields)),
            other => Err(DecodeError::NotAnObject(json_kind(&other))),
        }
    }

    pub fn into_message(self) -> Result<Message, DecodeError> {
        match self {
            Payload::Structured(message) => Ok(message),
            Payload::Raw(fields) => Message::try_from(fields),
        }
    }
}

impl TryFrom<Map<String, Value>> for Message {
    type Error = DecodeError;

    /// Absent (or `null`) required fields are `MissingField`; present fields
    /// of the wrong JSON type are `InvalidField`. Only `prioridade` may be
    /// absent or `null`.
    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        let id = required_string(&fields, FIELD_ID, &[])?;
        let content = required_string(&fields, FIELD_CONTENT, &["content"])?;
        let sender = required_string(&fields, FIELD_SENDER, &["sender"])?;

        let timestamp = lookup(&fields, FIELD_TIMESTAMP, &["timestamp"])
            .ok_or(DecodeError::MissingField(FIELD_TIMESTAMP))?;
        let timestamp = datetime_from_value(FIELD_TIMESTAMP, timestamp)?;

        let priority = match lookup(&fields, FIELD_PRIORITY, &["priority"]) {
            None => None,
            Some(Value::String(p)) => Some(p.as_str()),
            Some(_) => {
                return Err(DecodeError::InvalidField {
                    field: FIELD_PRIORITY,
                    expected: "a string",
                });
            }
        };

        Ok(Message::from_parts(id, content, sender, timestamp, priority))
    }
}

fn lookup<'a>(
    fields: &'a Map<String, Value>,
    name: &'static str,
    aliases: &[&'static str],
) -> Option<&'a Value> {
    std::iter::once(name)
        .chain(aliases.iter().copied())
        .filter_map(|key| fields.get(key))
        .find(|value| !value.is_null())
}

fn required_string(
    fields: &Map<String, Value>,
    name: &'static str,
    aliases: &[&'static str],
) -> Result<String, DecodeError> {
    match lookup(fields, name, aliases) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(DecodeError::InvalidField {
            field: name,
            expected: "a string",
        }),
        None => Err(DecodeError::MissingField(name)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
