//! AI controller panel for Home Assistant.
//!
//! Shows tool invocations and errors pushed by the backend integration and
//! sends free-text requests to it, one at a time.

pub mod bootstrap;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod model;
pub mod panel;
pub mod render;
pub mod state;
pub mod transport;

pub use bootstrap::{BootstrapOutcome, bootstrap};
pub use config::{ConfigError, PanelConfig};
pub use dispatch::{PendingSubmission, SubmitOutcome, SubmitRejection};
pub use error::{CredentialError, PanelError, Result};
pub use ingest::{EventRoute, EventRouter};
pub use model::{ActionRecord, ErrorRecord, ErrorSource, ProcessResponse, SubmissionState};
pub use panel::Panel;
pub use render::{PanelView, RenderOptions, render_text};
pub use state::{ConnectionStatus, PanelState};
pub use transport::{
    Connector, CredentialSource, EnvCredentialSource, HassConnector, PanelConnection,
    StaticCredentialSource,
};
