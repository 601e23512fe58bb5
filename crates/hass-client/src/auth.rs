//! Access-token credentials and WebSocket endpoint normalization.

use std::fmt;

use url::Url;

pub const WEBSOCKET_PATH: &str = "/api/websocket";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthInputError {
    #[error("instance url must not be empty")]
    EmptyUrl,
    #[error("instance url must use http://, https://, ws:// or wss:// and include a host")]
    InvalidUrl,
    #[error("access token must not be empty")]
    EmptyAccessToken,
}

/// Credentials for one Home Assistant instance.
#[derive(Clone, PartialEq, Eq)]
pub struct HassAuth {
    ws_url: Url,
    access_token: String,
}

impl HassAuth {
    /// Build credentials from an instance URL (http or ws form) and a long-lived token.
    pub fn new(instance_url: &str, access_token: &str) -> Result<Self, AuthInputError> {
        let ws_url = normalize_ws_url(instance_url)?;
        let access_token = access_token.trim();
        if access_token.is_empty() {
            return Err(AuthInputError::EmptyAccessToken);
        }
        Ok(Self {
            ws_url,
            access_token: access_token.to_string(),
        })
    }

    pub fn ws_url(&self) -> &Url {
        &self.ws_url
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for HassAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HassAuth")
            .field("ws_url", &self.ws_url.as_str())
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Map an instance URL onto its WebSocket API endpoint.
///
/// `http://host:8123` becomes `ws://host:8123/api/websocket`; `https` maps to
/// `wss`. A `ws(s)://` URL keeps an explicit path and gets the API path
/// appended when it has none.
pub fn normalize_ws_url(raw: &str) -> Result<Url, AuthInputError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AuthInputError::EmptyUrl);
    }

    let mut url = Url::parse(trimmed).map_err(|_| AuthInputError::InvalidUrl)?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(AuthInputError::InvalidUrl);
    }

    let (scheme, force_api_path) = match url.scheme() {
        "http" => ("ws", true),
        "https" => ("wss", true),
        "ws" => ("ws", false),
        "wss" => ("wss", false),
        _ => return Err(AuthInputError::InvalidUrl),
    };
    url.set_scheme(scheme)
        .map_err(|()| AuthInputError::InvalidUrl)?;

    let path = url.path().trim_end_matches('/').to_string();
    if force_api_path || path.is_empty() {
        url.set_path(&format!("{path}{WEBSOCKET_PATH}"));
    }
    Ok(url)
}
