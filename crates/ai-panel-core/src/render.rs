//! Pure projection of [`PanelState`] into a view, plus a plain-text renderer.

use std::fmt::Write as _;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde_json::Value;

use crate::state::{ConnectionStatus, PanelState};

pub const PANEL_TITLE: &str = "Home Assistant AI Controller";
pub const INPUT_PLACEHOLDER: &str = "Enter your request for the AI...";
pub const SUBMIT_LABEL: &str = "Send Request";
pub const SUBMIT_LABEL_BUSY: &str = "Processing...";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Offset timestamps are shown in.
    pub utc_offset: FixedOffset,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputView {
    pub value: String,
    pub placeholder: &'static str,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitView {
    pub label: &'static str,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorView {
    pub message: String,
    pub time: String,
    pub source: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionView {
    pub tool: String,
    pub time: String,
    pub input: String,
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelView {
    pub title: &'static str,
    /// Connection problem shown above the input, if any.
    pub banner: Option<String>,
    pub input: InputView,
    pub submit: SubmitView,
    pub last_response: Option<String>,
    /// `None` hides the section entirely.
    pub errors: Option<Vec<ErrorView>>,
    pub actions: Vec<ActionView>,
}

impl PanelView {
    pub fn from_state(state: &PanelState, options: RenderOptions) -> Self {
        let processing = state.submission.is_processing;
        let banner = match &state.connection {
            ConnectionStatus::Pending => Some("Connecting to Home Assistant...".to_string()),
            ConnectionStatus::Ready => None,
            ConnectionStatus::Degraded(reason) => Some(format!("Live updates unavailable: {reason}")),
            ConnectionStatus::Failed(reason) => Some(format!("Not connected: {reason}")),
        };

        let errors = (!state.errors.is_empty()).then(|| {
            state
                .errors
                .iter()
                .map(|record| ErrorView {
                    message: record.error.clone(),
                    time: format_timestamp(&record.timestamp, options.utc_offset),
                    source: record.source.label(),
                })
                .collect()
        });

        let actions = state
            .actions
            .iter()
            .map(|record| ActionView {
                tool: record.tool.clone(),
                time: format_timestamp(&record.timestamp, options.utc_offset),
                input: pretty_json(&record.input),
                result: pretty_json(&record.result),
            })
            .collect();

        Self {
            title: PANEL_TITLE,
            banner,
            input: InputView {
                value: state.submission.draft.clone(),
                placeholder: INPUT_PLACEHOLDER,
                disabled: processing,
            },
            submit: SubmitView {
                label: if processing {
                    SUBMIT_LABEL_BUSY
                } else {
                    SUBMIT_LABEL
                },
                disabled: processing || state.submission.draft_is_blank(),
            },
            last_response: state.last_response.clone(),
            errors,
            actions,
        }
    }
}

/// Local display form of an RFC 3339 timestamp; unparseable input is shown as-is.
pub fn format_timestamp(raw: &str, offset: FixedOffset) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&offset).format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{prefix}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_text(view: &PanelView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", view.title);
    if let Some(banner) = &view.banner {
        let _ = writeln!(out, "! {banner}");
    }

    let input = if view.input.value.is_empty() {
        format!("({})", view.input.placeholder)
    } else {
        view.input.value.clone()
    };
    let state = if view.submit.disabled { " (disabled)" } else { "" };
    let _ = writeln!(out, "> {input}");
    let _ = writeln!(out, "[{}]{state}", view.submit.label);

    if let Some(response) = &view.last_response {
        let _ = writeln!(out, "\nResponse:\n{}", indent(response, "  "));
    }

    if let Some(errors) = &view.errors {
        let _ = writeln!(out, "\nErrors:");
        for error in errors {
            let _ = writeln!(out, "  [{}] ({}) {}", error.time, error.source, error.message);
        }
    }

    let _ = writeln!(out, "\nRecent Actions:");
    if view.actions.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for action in &view.actions {
        let _ = writeln!(out, "  {} @ {}", action.tool, action.time);
        let _ = writeln!(out, "    Input:\n{}", indent(&action.input, "      "));
        let _ = writeln!(out, "    Result:\n{}", indent(&action.result, "      "));
    }
    out
}
