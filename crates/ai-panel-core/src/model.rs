//! Session-local records shown by the panel.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const UNKNOWN_ERROR: &str = "Unknown error";
pub const UNKNOWN_TOOL: &str = "unknown";

/// One backend tool invocation, as pushed on the action event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub tool: String,
    pub input: Value,
    pub result: Value,
    /// Client capture time, RFC 3339 UTC.
    pub timestamp: String,
}

impl ActionRecord {
    /// Copy `{tool, input, result}` out of an event payload.
    pub fn from_event_data(data: &Value, captured_at: DateTime<Utc>) -> Self {
        let tool = match data.get("tool") {
            Some(Value::String(tool)) => tool.clone(),
            Some(Value::Null) | None => UNKNOWN_TOOL.to_string(),
            Some(other) => other.to_string(),
        };
        Self {
            tool,
            input: data.get("input").cloned().unwrap_or(Value::Null),
            result: data.get("result").cloned().unwrap_or(Value::Null),
            timestamp: capture_timestamp(captured_at),
        }
    }
}

/// Where an error record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    /// Pushed on the error event.
    Event,
    /// `success: false` in a request response.
    Response,
    /// The request call itself failed.
    Transport,
}

impl ErrorSource {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Response => "response",
            Self::Transport => "transport",
        }
    }
}

/// One entry of the error list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error: String,
    /// Client capture time, RFC 3339 UTC.
    pub timestamp: String,
    pub source: ErrorSource,
}

impl ErrorRecord {
    pub fn new(error: impl Into<String>, source: ErrorSource, captured_at: DateTime<Utc>) -> Self {
        Self {
            error: error.into(),
            timestamp: capture_timestamp(captured_at),
            source,
        }
    }

    /// Copy `{error}` out of an event payload.
    pub fn from_event_data(data: &Value, captured_at: DateTime<Utc>) -> Self {
        let error = match data.get("error") {
            Some(Value::String(message)) => message.clone(),
            Some(Value::Null) | None => UNKNOWN_ERROR.to_string(),
            Some(other) => other.to_string(),
        };
        Self::new(error, ErrorSource::Event, captured_at)
    }
}

/// Structured reply of the process-request command.
///
/// Read leniently: a missing or non-boolean `success` counts as failure, and a
/// non-string `response` (the backend may send content blocks) is flattened
/// to text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl ProcessResponse {
    /// `None` when the reply is not a JSON object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let error = match object.get("error") {
            Some(Value::String(message)) => Some(message.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        Some(Self {
            success: object
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            error,
            response: object.get("response").and_then(response_text),
        })
    }
}

fn response_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Array(blocks) => {
            let texts: Option<Vec<&str>> = blocks
                .iter()
                .map(|block| block.get("text").and_then(Value::as_str))
                .collect();
            match texts {
                Some(texts) if !texts.is_empty() => Some(texts.join("\n")),
                _ => serde_json::to_string_pretty(value).ok(),
            }
        }
        other => serde_json::to_string_pretty(other).ok(),
    }
}

/// Draft text plus the single in-flight flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionState {
    pub is_processing: bool,
    pub draft: String,
}

impl SubmissionState {
    pub fn draft_is_blank(&self) -> bool {
        self.draft.trim().is_empty()
    }
}

pub fn capture_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
