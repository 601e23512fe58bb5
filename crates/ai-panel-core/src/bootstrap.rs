//! Connection bootstrap: credential, connect, subscribe.

use std::sync::Arc;

use hass_client::{EVENT_CHANNEL_CAPACITY, HassEvent};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::ingest::EventRouter;
use crate::transport::{Connector, CredentialSource, PanelConnection};

pub enum BootstrapOutcome {
    Ready {
        connection: Arc<dyn PanelConnection>,
        /// Events from every subscription, in arrival order.
        events: mpsc::Receiver<HassEvent>,
        /// First subscription failure, if any. The connection is still usable.
        subscription_failure: Option<String>,
    },
    Failed {
        reason: String,
    },
}

impl std::fmt::Debug for BootstrapOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready {
                subscription_failure,
                ..
            } => f
                .debug_struct("Ready")
                .field("subscription_failure", subscription_failure)
                .finish_non_exhaustive(),
            Self::Failed { reason } => f.debug_struct("Failed").field("reason", reason).finish(),
        }
    }
}

/// Obtain a credential, connect, and subscribe to every routed event.
///
/// Failures are logged and reported in the outcome, never raised.
pub async fn bootstrap(
    credentials: &dyn CredentialSource,
    connector: &dyn Connector,
    router: &EventRouter,
) -> BootstrapOutcome {
    let connection = match establish(credentials, connector).await {
        Ok(connection) => connection,
        Err(err) => {
            error!(error = %err, "bootstrap failed");
            return BootstrapOutcome::Failed {
                reason: err.to_string(),
            };
        }
    };

    let (sink, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let mut subscription_failure = None;
    for event_type in router.event_types() {
        match connection.subscribe(event_type, sink.clone()).await {
            Ok(()) => info!(event_type, "subscribed"),
            Err(err) => {
                warn!(event_type, error = %err, "subscription failed");
                subscription_failure
                    .get_or_insert_with(|| format!("subscription to {event_type} failed: {err}"));
            }
        }
    }

    BootstrapOutcome::Ready {
        connection,
        events,
        subscription_failure,
    }
}

async fn establish(
    credentials: &dyn CredentialSource,
    connector: &dyn Connector,
) -> Result<Arc<dyn PanelConnection>> {
    let auth = credentials.credential().await?;
    Ok(connector.connect(auth).await?)
}
