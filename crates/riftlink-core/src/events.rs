// ── Monitor notifications ──

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::ports::EventEmitter;
use crate::state::ClientState;

const EVENT_CHANNEL_SIZE: usize = 256;

/// Notifications published by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum MonitorEvent {
    ClientStateChanged(ClientState),
    ManagedAccountChanged(bool),
    MonitoringStarted { username: String },
    /// Account tracking is live; websocket handlers should subscribe.
    StartWebsocketHandlers,
    /// The session ended; websocket handlers should unsubscribe.
    StopWebsocketHandlers,
}

/// [`EventEmitter`] backed by a `tokio::sync::broadcast` channel.
///
/// Every subscriber sees every event emitted after it subscribed. Emitting
/// with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastEmitter {
    tx: broadcast::Sender<MonitorEvent>,
}

impl Default for BroadcastEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastEmitter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }
}

impl EventEmitter for BroadcastEmitter {
    fn emit(&self, event: MonitorEvent) {
        trace!(?event, "emit");
        let _ = self.tx.send(event);
    }
}
