//! Event ingestion: one dispatch table keyed by event name.
//!
//! Each event name maps to exactly one handler, and each subscription is
//! filtered server-side by that name, so an error event is recorded once.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hass_client::HassEvent;
use tracing::{debug, warn};

use crate::config::PanelConfig;
use crate::model::{ActionRecord, ErrorRecord};
use crate::state::PanelState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRoute {
    Action,
    Error,
}

#[derive(Debug, Clone)]
pub struct EventRouter {
    routes: BTreeMap<String, EventRoute>,
}

impl EventRouter {
    pub fn new(config: &PanelConfig) -> Self {
        let routes = BTreeMap::from([
            (config.action_event(), EventRoute::Action),
            (config.error_event(), EventRoute::Error),
        ]);
        Self { routes }
    }

    /// Event names to subscribe to, one subscription each.
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn route(&self, event_type: &str) -> Option<EventRoute> {
        self.routes.get(event_type).copied()
    }

    /// Record `event` in `state`; unknown event names are dropped.
    pub fn ingest(
        &self,
        state: &mut PanelState,
        event: &HassEvent,
        captured_at: DateTime<Utc>,
    ) -> Option<EventRoute> {
        let Some(route) = self.route(&event.event_type) else {
            warn!(event_type = %event.event_type, "dropping event without a route");
            return None;
        };

        match route {
            EventRoute::Action => {
                let record = ActionRecord::from_event_data(&event.data, captured_at);
                debug!(tool = %record.tool, "action event");
                state.push_action(record);
            }
            EventRoute::Error => {
                let record = ErrorRecord::from_event_data(&event.data, captured_at);
                debug!(error = %record.error, "error event");
                state.push_error(record);
            }
        }
        Some(route)
    }
}
