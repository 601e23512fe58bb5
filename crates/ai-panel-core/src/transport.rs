//! Seams between the panel and the host: credentials, connecting, and the live connection.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use hass_client::{
    ClientError, ConnectionConfig, HassAuth, HassConnection, HassEvent, Subscription,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::CredentialError;

pub const ENV_HASS_URL: &str = "HASS_URL";
pub const ENV_HASS_TOKEN: &str = "HASS_TOKEN";
pub const ENV_HASS_TOKEN_FILE: &str = "HASS_TOKEN_FILE";

/// Host-supplied authentication handle, obtained asynchronously.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn credential(&self) -> Result<HassAuth, CredentialError>;
}

/// Opens a live connection from a credential.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, auth: HassAuth) -> Result<Arc<dyn PanelConnection>, ClientError>;
}

/// What the panel needs from a live connection.
#[async_trait]
pub trait PanelConnection: Send + Sync {
    /// Register a server-filtered subscription delivering into `sink`.
    async fn subscribe(
        &self,
        event_type: &str,
        sink: mpsc::Sender<HassEvent>,
    ) -> Result<(), ClientError>;

    /// One request/response exchange; `payload` carries the request `type`.
    async fn call(&self, payload: Value) -> Result<Value, ClientError>;
}

/// Credential already in hand.
#[derive(Debug, Clone)]
pub struct StaticCredentialSource {
    auth: HassAuth,
}

impl StaticCredentialSource {
    pub fn new(auth: HassAuth) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn credential(&self) -> Result<HassAuth, CredentialError> {
        Ok(self.auth.clone())
    }
}

/// Credential from `HASS_URL` plus `HASS_TOKEN` or `HASS_TOKEN_FILE`.
///
/// An inline token wins over a token file.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialSource {
    pub url: Option<String>,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
}

impl EnvCredentialSource {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            url: non_empty(ENV_HASS_URL),
            token: non_empty(ENV_HASS_TOKEN),
            token_file: non_empty(ENV_HASS_TOKEN_FILE).map(PathBuf::from),
        }
    }
}

#[async_trait]
impl CredentialSource for EnvCredentialSource {
    async fn credential(&self) -> Result<HassAuth, CredentialError> {
        let url = self.url.as_deref().ok_or(CredentialError::MissingUrl)?;
        let token = match (&self.token, &self.token_file) {
            (Some(token), _) => token.clone(),
            (None, Some(path)) => {
                debug!(path = %path.display(), "reading access token file");
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| CredentialError::TokenFile {
                        path: path.clone(),
                        source,
                    })?
            }
            (None, None) => return Err(CredentialError::MissingToken),
        };
        Ok(HassAuth::new(url, &token)?)
    }
}

/// Connects through [`HassConnection`].
#[derive(Debug, Clone, Default)]
pub struct HassConnector {
    config: ConnectionConfig,
}

impl HassConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for HassConnector {
    async fn connect(&self, auth: HassAuth) -> Result<Arc<dyn PanelConnection>, ClientError> {
        let connection = HassConnection::connect(&auth, self.config.clone()).await?;
        Ok(Arc::new(connection))
    }
}

#[async_trait]
impl PanelConnection for HassConnection {
    async fn subscribe(
        &self,
        event_type: &str,
        sink: mpsc::Sender<HassEvent>,
    ) -> Result<(), ClientError> {
        self.subscribe_events(Subscription::with_sender(event_type, sink))
            .await
            .map(|_| ())
    }

    async fn call(&self, payload: Value) -> Result<Value, ClientError> {
        self.send_message(payload).await
    }
}
