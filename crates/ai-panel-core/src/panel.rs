//! The panel: owns state and wires bootstrap, ingestion and dispatch together.

use std::sync::Arc;

use chrono::Utc;
use hass_client::HassEvent;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::bootstrap::{BootstrapOutcome, bootstrap};
use crate::config::PanelConfig;
use crate::dispatch::{self, PendingSubmission, SubmitOutcome, SubmitRejection};
use crate::ingest::{EventRoute, EventRouter};
use crate::render::{PanelView, RenderOptions};
use crate::state::{ConnectionStatus, PanelState};
use crate::transport::{Connector, CredentialSource, PanelConnection};

pub struct Panel {
    config: PanelConfig,
    router: EventRouter,
    state: PanelState,
    connection: Option<Arc<dyn PanelConnection>>,
    bootstrap_attempted: bool,
}

impl Panel {
    pub fn new(config: PanelConfig) -> Self {
        let router = EventRouter::new(&config);
        let state = PanelState::new(config.history_limit);
        Self {
            config,
            router,
            state,
            connection: None,
            bootstrap_attempted: false,
        }
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Connect and subscribe, at most once per panel.
    ///
    /// Returns the merged event stream when a connection was established.
    pub async fn bootstrap(
        &mut self,
        credentials: &dyn CredentialSource,
        connector: &dyn Connector,
    ) -> Option<mpsc::Receiver<HassEvent>> {
        if self.bootstrap_attempted {
            debug!("bootstrap already attempted");
            return None;
        }
        self.bootstrap_attempted = true;

        match bootstrap(credentials, connector, &self.router).await {
            BootstrapOutcome::Ready {
                connection,
                events,
                subscription_failure,
            } => {
                self.state.connection = match subscription_failure {
                    Some(reason) => ConnectionStatus::Degraded(reason),
                    None => ConnectionStatus::Ready,
                };
                info!(status = ?self.state.connection, "panel connected");
                self.connection = Some(connection);
                Some(events)
            }
            BootstrapOutcome::Failed { reason } => {
                self.state.connection = ConnectionStatus::Failed(reason);
                None
            }
        }
    }

    /// Update the draft; ignored while a request is in flight.
    pub fn set_draft(&mut self, text: impl Into<String>) -> bool {
        if self.state.submission.is_processing {
            return false;
        }
        self.state.submission.draft = text.into();
        true
    }

    pub fn begin_submit(&mut self) -> Result<PendingSubmission, SubmitRejection> {
        let request_type = self.config.process_request_type();
        dispatch::begin_submit(&mut self.state, self.connection.as_ref(), &request_type)
    }

    pub fn finish_submit(&mut self, outcome: &SubmitOutcome) {
        dispatch::finish_submit(&mut self.state, outcome, Utc::now());
    }

    /// Set the draft and run one request to completion.
    ///
    /// A rejected submit leaves the state as it was, draft included.
    /// Events are not applied while this awaits; callers that must keep
    /// ingesting should drive [`Self::begin_submit`] and
    /// [`PendingSubmission::send`] themselves.
    pub async fn submit(&mut self, text: &str) -> Result<SubmitOutcome, SubmitRejection> {
        if self.state.submission.is_processing {
            return Err(SubmitRejection::AlreadyProcessing);
        }
        let previous = std::mem::replace(&mut self.state.submission.draft, text.to_string());
        let pending = match self.begin_submit() {
            Ok(pending) => pending,
            Err(rejection) => {
                self.state.submission.draft = previous;
                return Err(rejection);
            }
        };
        let outcome = pending.send().await;
        self.finish_submit(&outcome);
        Ok(outcome)
    }

    pub fn apply_event(&mut self, event: &HassEvent) -> Option<EventRoute> {
        self.router.ingest(&mut self.state, event, Utc::now())
    }

    pub fn view(&self, options: RenderOptions) -> PanelView {
        PanelView::from_state(&self.state, options)
    }
}
