//! Wire encoding for [`Message`].
//!
//! Two date-time layouts exist on the topic. `Iso` writes `dataHora` as an
//! ISO-8601 string. `Array` writes it as `[year, month, day, hour, minute,
//! second, nanos]`, dropping `nanos` when it is zero, which is what
//! producers that serialize date-times as timestamps emit.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::payload::DecodeError;
use super::{FIELD_TIMESTAMP, Message};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFormat {
    #[default]
    Iso,
    Array,
}

/// Encode a message into the JSON bytes handed to the broker.
pub fn encode(message: &Message, format: DateFormat) -> Result<Vec<u8>, serde_json::Error> {
    match format {
        DateFormat::Iso => serde_json::to_vec(message),
        DateFormat::Array => {
            let mut value = serde_json::to_value(message)?;
            if let Value::Object(fields) = &mut value {
                fields.insert(
                    FIELD_TIMESTAMP.to_string(),
                    datetime_to_array(message.timestamp()),
                );
            }
            serde_json::to_vec(&value)
        }
    }
}

pub fn datetime_to_array(timestamp: NaiveDateTime) -> Value {
    let mut parts = vec![
        Value::from(timestamp.year()),
        Value::from(timestamp.month()),
        Value::from(timestamp.day()),
        Value::from(timestamp.hour()),
        Value::from(timestamp.minute()),
        Value::from(timestamp.second()),
    ];
    if timestamp.nanosecond() != 0 {
        parts.push(Value::from(timestamp.nanosecond()));
    }
    Value::Array(parts)
}

/// Read a date-time from either an ISO-8601 string or a numeric array.
///
/// Arrays carry 5 to 7 components; a missing second or nanosecond
/// component is zero.
pub fn datetime_from_value(field: &'static str, value: &Value) -> Result<NaiveDateTime, DecodeError> {
    match value {
        Value::String(text) => parse_datetime_text(field, text),
        Value::Array(parts) => datetime_from_parts(field, parts),
        _ => Err(DecodeError::InvalidField {
            field,
            expected: "an ISO-8601 string or a numeric array",
        }),
    }
}

fn parse_datetime_text(field: &'static str, text: &str) -> Result<NaiveDateTime, DecodeError> {
    if let Ok(timestamp) = text.parse::<NaiveDateTime>() {
        return Ok(timestamp);
    }
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.naive_local())
        .map_err(|e| DecodeError::InvalidDateTime {
            field,
            reason: format!("{text:?}: {e}"),
        })
}

fn datetime_from_parts(field: &'static str, parts: &[Value]) -> Result<NaiveDateTime, DecodeError> {
    if !(5..=7).contains(&parts.len()) {
        return Err(DecodeError::InvalidDateTime {
            field,
            reason: format!("expected 5 to 7 components, got {}", parts.len()),
        });
    }

    let mut numbers = Vec::with_capacity(7);
    for (index, part) in parts.iter().enumerate() {
        let number = part.as_i64().ok_or_else(|| DecodeError::InvalidDateTime {
            field,
            reason: format!("component {index} is not an integer"),
        })?;
        numbers.push(number);
    }
    numbers.resize(7, 0);

    let out_of_range = || DecodeError::InvalidDateTime {
        field,
        reason: format!("components {numbers:?} are out of range"),
    };
    let year = i32::try_from(numbers[0]).map_err(|_| out_of_range())?;
    let [month, day, hour, minute, second, nanos] = [
        numbers[1], numbers[2], numbers[3], numbers[4], numbers[5], numbers[6],
    ]
    .map(|n| u32::try_from(n).ok());

    let (Some(month), Some(day), Some(hour), Some(minute), Some(second), Some(nanos)) =
        (month, day, hour, minute, second, nanos)
    else {
        return Err(out_of_range());
    };

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_nano_opt(hour, minute, second, nanos))
        .ok_or_else(out_of_range)
}
