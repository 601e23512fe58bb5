//! Panel error types.

use std::path::PathBuf;

use hass_client::{AuthInputError, ClientError};
use thiserror::Error;

/// Failure to obtain a credential from the host environment.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("HASS_URL is not set")]
    MissingUrl,
    #[error("neither HASS_TOKEN nor HASS_TOKEN_FILE is set")]
    MissingToken,
    #[error("failed to read token file {path}: {source}")]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Invalid(#[from] AuthInputError),
}

/// Panel error type.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("credential unavailable: {0}")]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Panel result type.
pub type Result<T> = std::result::Result<T, PanelError>;
