//! Live panel state: histories, submission and connection status.

use std::collections::VecDeque;

use crate::model::{ActionRecord, ErrorRecord, SubmissionState};

/// Outcome of connection bootstrap as the panel sees it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Bootstrap has not finished (or not started).
    #[default]
    Pending,
    Ready,
    /// Connected, but at least one event subscription failed.
    Degraded(String),
    /// No connection; requests are disabled for the rest of the session.
    Failed(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Ready | Self::Degraded(_))
    }
}

/// Everything the renderer reads. Both histories are newest-first.
#[derive(Debug, Clone, Default)]
pub struct PanelState {
    pub actions: VecDeque<ActionRecord>,
    pub errors: VecDeque<ErrorRecord>,
    pub submission: SubmissionState,
    pub connection: ConnectionStatus,
    pub last_response: Option<String>,
    history_limit: Option<usize>,
}

impl PanelState {
    pub fn new(history_limit: Option<usize>) -> Self {
        Self {
            history_limit,
            ..Self::default()
        }
    }

    pub fn push_action(&mut self, record: ActionRecord) {
        self.actions.push_front(record);
        if let Some(limit) = self.history_limit {
            self.actions.truncate(limit);
        }
    }

    pub fn push_error(&mut self, record: ErrorRecord) {
        self.errors.push_front(record);
        if let Some(limit) = self.history_limit {
            self.errors.truncate(limit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ErrorSource;
    use chrono::Utc;
    use serde_json::Value;

    fn action(tool: &str) -> ActionRecord {
        ActionRecord {
            tool: tool.to_string(),
            input: Value::Null,
            result: Value::Null,
            timestamp: String::new(),
        }
    }

    #[test]
    fn records_are_prepended() {
        let mut state = PanelState::new(None);
        state.push_action(action("a"));
        state.push_action(action("b"));
        state.push_action(action("c"));

        let tools: Vec<&str> = state.actions.iter().map(|a| a.tool.as_str()).collect();
        assert_eq!(tools, vec!["c", "b", "a"]);
    }

    #[test]
    fn history_limit_evicts_oldest() {
        let mut state = PanelState::new(Some(2));
        for n in 0..5 {
            state.push_error(ErrorRecord::new(
                format!("e{n}"),
                ErrorSource::Event,
                Utc::now(),
            ));
        }
        let messages: Vec<&str> = state.errors.iter().map(|e| e.error.as_str()).collect();
        assert_eq!(messages, vec!["e4", "e3"]);
    }

    #[test]
    fn connection_status_gates() {
        assert!(!ConnectionStatus::Pending.is_connected());
        assert!(ConnectionStatus::Ready.is_connected());
        assert!(ConnectionStatus::Degraded("x".to_string()).is_connected());
        assert!(!ConnectionStatus::Failed("x".to_string()).is_connected());
    }
}
