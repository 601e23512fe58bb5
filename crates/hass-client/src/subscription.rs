//! Subscription handles for receiving server-filtered events.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::error::{ClientError, Result};
use crate::message::HassEvent;

/// Callback type for handling received events.
pub type EventCallback = Arc<dyn Fn(HassEvent) -> Result<()> + Send + Sync>;

/// Bound on events queued for a consumer that has fallen behind.
pub const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// A subscription to one event type on the server bus.
#[derive(Clone)]
pub struct Subscription {
    /// Event type the server filters on.
    pub event_type: String,
    delivered: Arc<AtomicU64>,
    callback: Option<EventCallback>,
    event_tx: Option<mpsc::Sender<HassEvent>>,
}

impl Subscription {
    /// Subscription that only counts deliveries.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            delivered: Arc::new(AtomicU64::new(0)),
            callback: None,
            event_tx: None,
        }
    }

    /// Create a subscription with callback-based event handling.
    pub fn with_callback(event_type: impl Into<String>, callback: EventCallback) -> Self {
        Self {
            callback: Some(callback),
            ..Self::new(event_type)
        }
    }

    /// Create a subscription that receives events on a bounded channel.
    pub fn with_channel(event_type: impl Into<String>) -> (Self, mpsc::Receiver<HassEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let subscription = Self {
            event_tx: Some(tx),
            ..Self::new(event_type)
        };
        (subscription, rx)
    }

    /// Forward into an existing sender; several subscriptions may share one.
    pub fn with_sender(event_type: impl Into<String>, sender: mpsc::Sender<HassEvent>) -> Self {
        Self {
            event_tx: Some(sender),
            ..Self::new(event_type)
        }
    }

    /// Handle a received event.
    pub fn handle_event(&self, event: HassEvent) -> Result<()> {
        self.delivered.fetch_add(1, Ordering::Relaxed);

        if let Some(callback) = &self.callback {
            callback(event.clone())?;
        }

        if let Some(tx) = &self.event_tx {
            tx.try_send(event).map_err(|error| match error {
                mpsc::error::TrySendError::Full(_) => {
                    ClientError::Subscription("event channel full - consumer too slow".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    ClientError::Subscription("event channel closed".to_string())
                }
            })?;
        }

        Ok(())
    }

    /// Number of events handed to this subscription so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}
