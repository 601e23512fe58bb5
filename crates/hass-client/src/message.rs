//! Wire frames of the Home Assistant WebSocket API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{ClientError, Result};

/// Event pushed on a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HassEvent {
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_fired: Option<String>,
}

/// Error body of a failed `result` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

/// Message received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    AuthRequired { ha_version: Option<String> },
    AuthOk { ha_version: Option<String> },
    AuthInvalid { message: String },
    Result {
        id: u64,
        outcome: std::result::Result<Value, CommandError>,
    },
    Event { id: u64, event: HassEvent },
    Pong { id: u64 },
}

impl ServerMessage {
    /// Id of the client message this frame answers, if any.
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Result { id, .. } | Self::Event { id, .. } | Self::Pong { id } => Some(*id),
            Self::AuthRequired { .. } | Self::AuthOk { .. } | Self::AuthInvalid { .. } => None,
        }
    }
}

pub(crate) fn auth_message(access_token: &str) -> Value {
    json!({"type": "auth", "access_token": access_token})
}

pub(crate) fn subscribe_events_message(id: u64, event_type: &str) -> Value {
    json!({"id": id, "type": "subscribe_events", "event_type": event_type})
}

pub(crate) fn unsubscribe_events_message(id: u64, subscription: u64) -> Value {
    json!({"id": id, "type": "unsubscribe_events", "subscription": subscription})
}

pub(crate) fn ping_message(id: u64) -> Value {
    json!({"id": id, "type": "ping"})
}

/// Stamp an id onto an arbitrary command payload.
///
/// The payload must be a JSON object carrying a string `type`.
pub(crate) fn command_message(id: u64, payload: Value) -> Result<Value> {
    let Value::Object(mut fields) = payload else {
        return Err(ClientError::Protocol(
            "command payload must be a JSON object".to_string(),
        ));
    };
    if !fields.get("type").is_some_and(Value::is_string) {
        return Err(ClientError::Protocol(
            "command payload missing string type".to_string(),
        ));
    }
    fields.insert("id".to_string(), Value::from(id));
    Ok(Value::Object(fields))
}

/// Parse a server JSON text frame into a typed message.
///
/// Unknown message types yield `None`.
pub fn parse_server_message(text: &str) -> Result<Option<ServerMessage>> {
    let value: Value = serde_json::from_str(text)?;
    let object = value
        .as_object()
        .ok_or_else(|| ClientError::Protocol("expected JSON object message".to_string()))?;
    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::Protocol("missing message type".to_string()))?;

    match kind {
        "auth_required" => Ok(Some(ServerMessage::AuthRequired {
            ha_version: optional_string(object, "ha_version"),
        })),
        "auth_ok" => Ok(Some(ServerMessage::AuthOk {
            ha_version: optional_string(object, "ha_version"),
        })),
        "auth_invalid" => Ok(Some(ServerMessage::AuthInvalid {
            message: optional_string(object, "message")
                .unwrap_or_else(|| "invalid access token".to_string()),
        })),
        "result" => {
            let id = message_id(object, "result")?;
            let success = object
                .get("success")
                .and_then(Value::as_bool)
                .ok_or_else(|| ClientError::Protocol("invalid result success flag".to_string()))?;
            let outcome = if success {
                Ok(object.get("result").cloned().unwrap_or(Value::Null))
            } else {
                Err(parse_command_error(object.get("error")))
            };
            Ok(Some(ServerMessage::Result { id, outcome }))
        }
        "event" => {
            let id = message_id(object, "event")?;
            let raw = object
                .get("event")
                .cloned()
                .ok_or_else(|| ClientError::Protocol("missing event payload".to_string()))?;
            let event: HassEvent = serde_json::from_value(raw).map_err(|error| {
                ClientError::Protocol(format!("invalid event payload: {}", error))
            })?;
            Ok(Some(ServerMessage::Event { id, event }))
        }
        "pong" => Ok(Some(ServerMessage::Pong {
            id: message_id(object, "pong")?,
        })),
        _ => Ok(None),
    }
}

fn message_id(object: &Map<String, Value>, kind: &str) -> Result<u64> {
    object
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| ClientError::Protocol(format!("invalid {kind} message id")))
}

fn optional_string(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn parse_command_error(error: Option<&Value>) -> CommandError {
    let field = |key: &str| {
        error
            .and_then(|error| error.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    CommandError {
        code: field("code").unwrap_or_else(|| "unknown_error".to_string()),
        message: field("message").unwrap_or_else(|| "Unknown error".to_string()),
    }
}
