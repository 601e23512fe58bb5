//! Minimal Home Assistant WebSocket API client.
//!
//! Surface:
//! - access-token auth handshake
//! - request/response commands keyed by message id
//! - server-filtered event subscriptions

pub mod auth;
pub mod connection;
pub mod error;
pub mod message;
pub mod subscription;

pub use auth::{AuthInputError, HassAuth};
pub use connection::{ConnectionConfig, ConnectionState, HassConnection};
pub use error::{ClientError, Result};
pub use message::{CommandError, HassEvent, ServerMessage, parse_server_message};
pub use subscription::{EVENT_CHANNEL_CAPACITY, EventCallback, Subscription};
