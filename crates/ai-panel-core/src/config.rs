//! Panel configuration loaded from the environment.

use std::env;
use std::time::Duration;

use hass_client::ConnectionConfig;
use thiserror::Error;

pub const DEFAULT_EVENT_NAMESPACE: &str = "ha_ai_controller";
pub const DEFAULT_COMMAND_NAMESPACE: &str = "ai_controller";
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;

pub const ENV_EVENT_NAMESPACE: &str = "AI_PANEL_EVENT_NAMESPACE";
pub const ENV_COMMAND_NAMESPACE: &str = "AI_PANEL_COMMAND_NAMESPACE";
pub const ENV_HISTORY_LIMIT: &str = "AI_PANEL_HISTORY_LIMIT";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "AI_PANEL_CONNECT_TIMEOUT_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "AI_PANEL_REQUEST_TIMEOUT_MS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid AI_PANEL_EVENT_NAMESPACE: {0}")]
    InvalidEventNamespace(String),
    #[error("invalid AI_PANEL_COMMAND_NAMESPACE: {0}")]
    InvalidCommandNamespace(String),
    #[error("invalid AI_PANEL_HISTORY_LIMIT: {0}")]
    InvalidHistoryLimit(String),
    #[error("invalid AI_PANEL_CONNECT_TIMEOUT_MS: {0}")]
    InvalidConnectTimeoutMs(String),
    #[error("invalid AI_PANEL_REQUEST_TIMEOUT_MS: {0}")]
    InvalidRequestTimeoutMs(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanelConfig {
    /// Prefix of the pushed event names (`<ns>_action`, `<ns>_error`).
    pub event_namespace: String,
    /// Prefix of the request type (`<ns>/process_request`).
    pub command_namespace: String,
    /// `None` keeps every record for the session.
    pub history_limit: Option<usize>,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            event_namespace: DEFAULT_EVENT_NAMESPACE.to_string(),
            command_namespace: DEFAULT_COMMAND_NAMESPACE.to_string(),
            history_limit: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl PanelConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let event_namespace = match non_empty(ENV_EVENT_NAMESPACE) {
            Some(value) => parse_namespace(&value).map_err(ConfigError::InvalidEventNamespace)?,
            None => DEFAULT_EVENT_NAMESPACE.to_string(),
        };
        let command_namespace = match non_empty(ENV_COMMAND_NAMESPACE) {
            Some(value) => {
                parse_namespace(&value).map_err(ConfigError::InvalidCommandNamespace)?
            }
            None => DEFAULT_COMMAND_NAMESPACE.to_string(),
        };
        let history_limit = non_empty(ENV_HISTORY_LIMIT)
            .map(|value| parse_history_limit(&value))
            .transpose()
            .map_err(ConfigError::InvalidHistoryLimit)?;
        let connect_timeout_ms = non_empty(ENV_CONNECT_TIMEOUT_MS)
            .unwrap_or_else(|| DEFAULT_CONNECT_TIMEOUT_MS.to_string())
            .parse::<u64>()
            .map_err(|error| ConfigError::InvalidConnectTimeoutMs(error.to_string()))?
            .max(1);
        let request_timeout_ms = non_empty(ENV_REQUEST_TIMEOUT_MS)
            .unwrap_or_else(|| DEFAULT_REQUEST_TIMEOUT_MS.to_string())
            .parse::<u64>()
            .map_err(|error| ConfigError::InvalidRequestTimeoutMs(error.to_string()))?
            .max(1);

        Ok(Self {
            event_namespace,
            command_namespace,
            history_limit,
            connect_timeout_ms,
            request_timeout_ms,
        })
    }

    pub fn action_event(&self) -> String {
        format!("{}_action", self.event_namespace)
    }

    pub fn error_event(&self) -> String {
        format!("{}_error", self.event_namespace)
    }

    pub fn process_request_type(&self) -> String {
        format!("{}/process_request", self.command_namespace)
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

pub fn parse_namespace(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("namespace must not be empty".to_string());
    }
    if let Some(bad) = trimmed
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || *ch == '_'))
    {
        return Err(format!("unexpected character {bad:?} in {trimmed:?}"));
    }
    Ok(trimmed.to_string())
}

pub fn parse_history_limit(raw: &str) -> Result<usize, String> {
    let limit = raw.trim().parse::<usize>().map_err(|error| error.to_string())?;
    if limit == 0 {
        return Err("history limit must be at least 1".to_string());
    }
    Ok(limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<PanelConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        PanelConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_backend_integration() -> Result<(), ConfigError> {
        let config = load(&[])?;
        assert_eq!(config, PanelConfig::default());
        assert_eq!(config.action_event(), "ha_ai_controller_action");
        assert_eq!(config.error_event(), "ha_ai_controller_error");
        assert_eq!(config.process_request_type(), "ai_controller/process_request");
        assert_eq!(config.history_limit, None);
        Ok(())
    }

    #[test]
    fn overrides_are_trimmed_and_applied() -> Result<(), ConfigError> {
        let config = load(&[
            (ENV_EVENT_NAMESPACE, " my_ai "),
            (ENV_COMMAND_NAMESPACE, "my_ai"),
            (ENV_HISTORY_LIMIT, "50"),
            (ENV_REQUEST_TIMEOUT_MS, "2500"),
            (ENV_CONNECT_TIMEOUT_MS, ""),
        ])?;
        assert_eq!(config.action_event(), "my_ai_action");
        assert_eq!(config.process_request_type(), "my_ai/process_request");
        assert_eq!(config.history_limit, Some(50));
        assert_eq!(
            config.connection_config().request_timeout,
            Duration::from_millis(2500)
        );
        assert_eq!(config.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        Ok(())
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let cases = [
            (ENV_EVENT_NAMESPACE, "has space", "AI_PANEL_EVENT_NAMESPACE"),
            (ENV_COMMAND_NAMESPACE, "a/b", "AI_PANEL_COMMAND_NAMESPACE"),
            (ENV_HISTORY_LIMIT, "0", "AI_PANEL_HISTORY_LIMIT"),
            (ENV_HISTORY_LIMIT, "lots", "AI_PANEL_HISTORY_LIMIT"),
            (ENV_CONNECT_TIMEOUT_MS, "-1", "AI_PANEL_CONNECT_TIMEOUT_MS"),
            (ENV_REQUEST_TIMEOUT_MS, "soon", "AI_PANEL_REQUEST_TIMEOUT_MS"),
        ];
        for (key, value, fragment) in cases {
            let result = load(&[(key, value)]);
            assert!(result.is_err(), "{key}={value} should fail, got {result:?}");
            let Err(error) = result else {
                continue;
            };
            assert!(
                error.to_string().contains(fragment),
                "{key}={value}: '{error}' should mention {fragment}"
            );
        }
    }
}
