//! Single authenticated connection to a Home Assistant instance.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use crate::auth::HassAuth;
use crate::error::{ClientError, Result};
use crate::message::{
    ServerMessage, auth_message, command_message, parse_server_message, ping_message,
    subscribe_events_message, unsubscribe_events_message,
};
use crate::subscription::Subscription;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;
type PendingReply = oneshot::Sender<Result<Value>>;
type PendingReplies = HashMap<u64, PendingReply>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Covers the TCP/WebSocket handshake and the auth exchange.
    pub connect_timeout: Duration,
    /// Upper bound on waiting for a `result` frame.
    pub request_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Authenticated Home Assistant WebSocket connection.
pub struct HassConnection {
    url: Url,
    config: ConnectionConfig,
    ha_version: Option<String>,
    state: Arc<RwLock<ConnectionState>>,
    writer: Arc<Mutex<Option<WsWriter>>>,
    next_id: AtomicU64,
    pending: Arc<Mutex<PendingReplies>>,
    subscriptions: Arc<Mutex<HashMap<u64, Subscription>>>,
    recv_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl HassConnection {
    /// Connect, authenticate and start the background receive loop.
    pub async fn connect(auth: &HassAuth, config: ConnectionConfig) -> Result<Self> {
        let url = auth.ws_url().clone();
        let (stream, ha_version) = timeout(config.connect_timeout, open_and_authenticate(auth))
            .await
            .map_err(|_| {
                ClientError::Timeout(format!(
                    "connection timeout after {:?}",
                    config.connect_timeout
                ))
            })??;
        debug!(url = %url, ha_version = ?ha_version, "authenticated with home assistant");

        let (writer, reader) = stream.split();
        let connection = Self {
            url,
            config,
            ha_version,
            state: Arc::new(RwLock::new(ConnectionState::Connected)),
            writer: Arc::new(Mutex::new(Some(writer))),
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(PendingReplies::new())),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            recv_task: Mutex::new(None),
        };
        let task = connection.spawn_receive_loop(reader);
        *connection.recv_task.lock().await = Some(task);
        Ok(connection)
    }

    /// WebSocket endpoint URL.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Server version reported during auth.
    pub fn ha_version(&self) -> Option<&str> {
        self.ha_version.as_deref()
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Send a command and wait for its `result` frame.
    ///
    /// `payload` is a JSON object with a string `type`; the id is assigned here.
    /// A `success: false` result surfaces as [`ClientError::Command`].
    pub async fn send_message(&self, payload: Value) -> Result<Value> {
        let id = self.allocate_id();
        let message = command_message(id, payload)?;
        self.request(id, message).await
    }

    /// Register a server-filtered subscription; returns its subscription id.
    pub async fn subscribe_events(&self, subscription: Subscription) -> Result<u64> {
        let id = self.allocate_id();
        let message = subscribe_events_message(id, &subscription.event_type);
        let event_type = subscription.event_type.clone();
        self.subscriptions.lock().await.insert(id, subscription);

        if let Err(error) = self.request(id, message).await {
            self.subscriptions.lock().await.remove(&id);
            return Err(error);
        }
        debug!(subscription_id = id, event_type = %event_type, "subscribed to events");
        Ok(id)
    }

    /// Close a subscription previously returned by [`Self::subscribe_events`].
    pub async fn unsubscribe_events(&self, subscription_id: u64) -> Result<()> {
        let id = self.allocate_id();
        self.request(id, unsubscribe_events_message(id, subscription_id))
            .await?;
        self.subscriptions.lock().await.remove(&subscription_id);
        Ok(())
    }

    /// Round-trip a ping frame.
    pub async fn ping(&self) -> Result<()> {
        let id = self.allocate_id();
        self.request(id, ping_message(id)).await.map(|_| ())
    }

    /// Close the socket and stop the receive loop.
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer
                .send(Message::Close(None))
                .await
                .map_err(|error| ClientError::WebSocket(error.to_string()))?;
        }

        if let Some(task) = self.recv_task.lock().await.take() {
            task.abort();
        }

        *self.state.write().await = ConnectionState::Disconnected;
        fail_pending(&self.pending).await;
        Ok(())
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn request(&self, id: u64, message: Value) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(error) = self.send_json(&message).await {
            self.pending.lock().await.remove(&id);
            return Err(error);
        }

        match timeout(self.config.request_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_canceled)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(ClientError::Timeout(format!(
                    "no result for message {} after {:?}",
                    id, self.config.request_timeout
                )))
            }
        }
    }

    async fn send_json(&self, value: &Value) -> Result<()> {
        if self.state().await != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let text = serde_json::to_string(value)?;
        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(ClientError::NotConnected)?;
        writer
            .send(Message::Text(text.into()))
            .await
            .map_err(|error| ClientError::WebSocket(error.to_string()))
    }

    fn spawn_receive_loop(&self, mut reader: WsReader) -> tokio::task::JoinHandle<()> {
        let pending = Arc::clone(&self.pending);
        let subscriptions = Arc::clone(&self.subscriptions);
        let state = Arc::clone(&self.state);
        let url = self.url.to_string();

        tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match parse_server_message(text.as_str()) {
                        Ok(Some(ServerMessage::Event { id, event })) => {
                            let subscription = { subscriptions.lock().await.get(&id).cloned() };
                            match subscription {
                                Some(subscription) => {
                                    if let Err(error) = subscription.handle_event(event) {
                                        warn!("subscription {} handler error on {}: {}", id, url, error);
                                    }
                                }
                                None => debug!(
                                    subscription_id = id,
                                    event_type = %event.event_type,
                                    "event for unknown subscription"
                                ),
                            }
                        }
                        Ok(Some(ServerMessage::Result { id, outcome })) => {
                            let outcome = outcome.map_err(|error| ClientError::Command {
                                code: error.code,
                                message: error.message,
                            });
                            resolve_pending(&pending, id, outcome).await;
                        }
                        Ok(Some(ServerMessage::Pong { id })) => {
                            resolve_pending(&pending, id, Ok(Value::Null)).await;
                        }
                        Ok(Some(message)) => {
                            warn!("unexpected auth frame after handshake on {}: {:?}", url, message);
                        }
                        Ok(None) => {}
                        Err(error) => {
                            warn!("protocol parse error on {}: {}", url, error);
                        }
                    },
                    Ok(Message::Ping(payload)) => {
                        debug!("received ping from {} ({} bytes)", url, payload.len());
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Binary(_)) => {}
                    Ok(Message::Frame(_)) => {}
                    Err(error) => {
                        warn!("websocket read error on {}: {}", url, error);
                        break;
                    }
                }
            }

            *state.write().await = ConnectionState::Disconnected;
            fail_pending(&pending).await;
            debug!("receive loop for {} finished", url);
        })
    }
}

impl Drop for HassConnection {
    fn drop(&mut self) {
        if let Ok(mut task) = self.recv_task.try_lock()
            && let Some(task) = task.take()
        {
            task.abort();
        }
    }
}

async fn open_and_authenticate(auth: &HassAuth) -> Result<(WsStream, Option<String>)> {
    let (mut stream, _response) = connect_async(auth.ws_url().as_str())
        .await
        .map_err(|error| ClientError::Connection(format!("{}: {error}", auth.ws_url())))?;

    match next_server_message(&mut stream).await? {
        ServerMessage::AuthRequired { .. } => {}
        other => {
            return Err(ClientError::Protocol(format!(
                "expected auth_required, got {other:?}"
            )));
        }
    }

    let text = serde_json::to_string(&auth_message(auth.access_token()))?;
    stream
        .send(Message::Text(text.into()))
        .await
        .map_err(|error| ClientError::WebSocket(error.to_string()))?;

    match next_server_message(&mut stream).await? {
        ServerMessage::AuthOk { ha_version } => Ok((stream, ha_version)),
        ServerMessage::AuthInvalid { message } => Err(ClientError::AuthRejected(message)),
        other => Err(ClientError::Protocol(format!(
            "expected auth_ok, got {other:?}"
        ))),
    }
}

async fn next_server_message(stream: &mut WsStream) -> Result<ServerMessage> {
    while let Some(frame) = stream.next().await {
        match frame.map_err(|error| ClientError::WebSocket(error.to_string()))? {
            Message::Text(text) => {
                if let Some(message) = parse_server_message(text.as_str())? {
                    return Ok(message);
                }
            }
            Message::Close(_) => return Err(ClientError::ConnectionClosed),
            _ => {}
        }
    }
    Err(ClientError::ConnectionClosed)
}

async fn resolve_pending(pending: &Mutex<PendingReplies>, id: u64, outcome: Result<Value>) {
    match pending.lock().await.remove(&id) {
        Some(sender) => {
            let _ = sender.send(outcome);
        }
        None => warn!(id, "result without pending request"),
    }
}

async fn fail_pending(pending: &Mutex<PendingReplies>) {
    for (_, sender) in pending.lock().await.drain() {
        let _ = sender.send(Err(ClientError::ConnectionClosed));
    }
}
