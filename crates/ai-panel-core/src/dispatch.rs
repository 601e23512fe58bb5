//! Request dispatch: precondition check, the single call, and its bookkeeping.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{ErrorRecord, ErrorSource, ProcessResponse, UNKNOWN_ERROR};
use crate::state::PanelState;
use crate::transport::PanelConnection;

/// Why a submit did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitRejection {
    #[error("not connected to Home Assistant")]
    NotConnected,
    #[error("request text is empty")]
    EmptyInput,
    #[error("a request is already being processed")]
    AlreadyProcessing,
}

/// Result of one dispatched request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Succeeded { response: Option<String> },
    /// The backend answered `success: false`.
    Rejected { error: String },
    /// The call itself failed.
    Failed { error: String },
}

/// A request that passed the preconditions and is ready to go on the wire.
///
/// Owns everything it needs, so the caller can await it while it keeps
/// handling pushed events.
pub struct PendingSubmission {
    connection: Arc<dyn PanelConnection>,
    request_type: String,
    input: String,
}

impl PendingSubmission {
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn payload(&self) -> Value {
        process_request_payload(&self.request_type, &self.input)
    }

    pub async fn send(self) -> SubmitOutcome {
        match self.connection.call(self.payload()).await {
            Ok(value) => interpret_response(value),
            Err(error) => SubmitOutcome::Failed {
                error: error.to_string(),
            },
        }
    }
}

pub fn process_request_payload(request_type: &str, input: &str) -> Value {
    json!({"type": request_type, "input": input})
}

/// Check preconditions and mark the panel busy.
///
/// On rejection the state is left untouched.
pub fn begin_submit(
    state: &mut PanelState,
    connection: Option<&Arc<dyn PanelConnection>>,
    request_type: &str,
) -> Result<PendingSubmission, SubmitRejection> {
    let Some(connection) = connection else {
        return Err(SubmitRejection::NotConnected);
    };
    if state.submission.is_processing {
        return Err(SubmitRejection::AlreadyProcessing);
    }
    if state.submission.draft_is_blank() {
        return Err(SubmitRejection::EmptyInput);
    }

    state.submission.is_processing = true;
    Ok(PendingSubmission {
        connection: Arc::clone(connection),
        request_type: request_type.to_string(),
        input: state.submission.draft.clone(),
    })
}

/// Record the outcome, then reset the busy flag and clear the draft.
pub fn finish_submit(state: &mut PanelState, outcome: &SubmitOutcome, captured_at: DateTime<Utc>) {
    match outcome {
        SubmitOutcome::Succeeded { response } => {
            debug!("request succeeded");
            if let Some(response) = response {
                state.last_response = Some(response.clone());
            }
        }
        SubmitOutcome::Rejected { error } => {
            warn!(error = %error, "request rejected by backend");
            state.push_error(ErrorRecord::new(
                error.clone(),
                ErrorSource::Response,
                captured_at,
            ));
        }
        SubmitOutcome::Failed { error } => {
            warn!(error = %error, "request failed");
            state.push_error(ErrorRecord::new(
                error.clone(),
                ErrorSource::Transport,
                captured_at,
            ));
        }
    }

    state.submission.is_processing = false;
    state.submission.draft.clear();
}

fn interpret_response(value: Value) -> SubmitOutcome {
    match ProcessResponse::from_value(&value) {
        Some(ProcessResponse {
            success: true,
            response,
            ..
        }) => SubmitOutcome::Succeeded { response },
        Some(ProcessResponse { error, .. }) => SubmitOutcome::Rejected {
            error: error.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
        },
        None => SubmitOutcome::Failed {
            error: format!("malformed response: expected JSON object, got {value}"),
        },
    }
}
