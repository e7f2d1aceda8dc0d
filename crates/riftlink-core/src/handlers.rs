// ── Websocket handler bridge ──
//
// Turns live account events from the event bus into `PartialAccount`
// patches. Follows the monitor's start/stop signals: routes and
// subscriptions exist only while an account session is tracked.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use riftlink_api::{ApiEvent, EventType, SubscriptionManager};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::account_store::{RANKED_PATH, SUMMONER_PATH, WALLET_PATH};
use crate::events::MonitorEvent;
use crate::model::{PartialAccount, RankedPayload, SummonerPayload, WalletPayload};
use crate::ports::AccountState;

/// Paths the bridge subscribes to while a session is tracked.
pub const ACCOUNT_ROUTES: [&str; 3] = [SUMMONER_PATH, WALLET_PATH, RANKED_PATH];

const PATCH_QUEUE_SIZE: usize = 64;

/// Parse an event payload for `route` into a patch. `None` when the payload
/// does not parse or carries nothing useful.
pub fn patch_for(route: &str, data: &Value) -> Option<PartialAccount> {
    fn parse<T: DeserializeOwned + Into<PartialAccount>>(data: &Value) -> Option<PartialAccount> {
        T::deserialize(data).ok().map(Into::into)
    }

    let patch = match route {
        SUMMONER_PATH => parse::<SummonerPayload>(data),
        WALLET_PATH => parse::<WalletPayload>(data),
        RANKED_PATH => parse::<RankedPayload>(data),
        _ => None,
    }?;
    (!patch.is_empty()).then_some(patch)
}

/// Wires account routes onto the subscription manager.
#[derive(Clone)]
pub struct WebsocketHandlerBridge {
    manager: SubscriptionManager,
    accounts: Arc<dyn AccountState>,
    cancel: CancellationToken,
}

impl WebsocketHandlerBridge {
    pub fn new(manager: SubscriptionManager, accounts: Arc<dyn AccountState>) -> Self {
        Self {
            manager,
            accounts,
            cancel: CancellationToken::new(),
        }
    }

    /// Spawn the merge task and the event listener.
    pub fn spawn(&self, events: broadcast::Receiver<MonitorEvent>) -> JoinHandle<()> {
        let (tx, rx) = mpsc::channel(PATCH_QUEUE_SIZE);
        tokio::spawn(merge_task(
            Arc::clone(&self.accounts),
            rx,
            self.cancel.clone(),
        ));

        let bridge = self.clone();
        tokio::spawn(async move { bridge.listen(events, tx).await })
    }

    /// Stop listening and merging. Safe to call repeatedly.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    async fn listen(
        &self,
        mut events: broadcast::Receiver<MonitorEvent>,
        tx: mpsc::Sender<PartialAccount>,
    ) {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => {
                        let handled = AssertUnwindSafe(self.on_event(&event, &tx)).catch_unwind();
                        if handled.await.is_err() {
                            warn!(?event, "monitor event handler panicked; listening continues");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "handler bridge lagged behind monitor events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        self.stop_handlers().await;
        debug!("handler bridge exiting");
    }

    async fn on_event(&self, event: &MonitorEvent, tx: &mpsc::Sender<PartialAccount>) {
        match event {
            MonitorEvent::StartWebsocketHandlers => self.start_handlers(tx).await,
            MonitorEvent::StopWebsocketHandlers => self.stop_handlers().await,
            _ => {}
        }
    }

    /// Register every account route and subscribe its path.
    pub async fn start_handlers(&self, tx: &mpsc::Sender<PartialAccount>) {
        for route in ACCOUNT_ROUTES {
            let tx = tx.clone();
            self.manager
                .router()
                .register_handler(route, move |event: &ApiEvent| {
                    if event.event_type == EventType::Delete {
                        return;
                    }
                    let Some(patch) = patch_for(route, &event.data) else {
                        trace!(uri = %event.uri, "event carried no account data");
                        return;
                    };
                    if tx.try_send(patch).is_err() {
                        warn!(uri = %event.uri, "account patch queue full; dropping event");
                    }
                });
            self.manager.subscribe(route).await;
        }
        debug!("account websocket handlers started");
    }

    /// Unsubscribe every account route (also removes its handler).
    pub async fn stop_handlers(&self) {
        for route in ACCOUNT_ROUTES {
            self.manager.unsubscribe(route).await;
        }
        debug!("account websocket handlers stopped");
    }
}

async fn merge_task(
    accounts: Arc<dyn AccountState>,
    mut rx: mpsc::Receiver<PartialAccount>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            patch = rx.recv() => {
                let Some(patch) = patch else { break };
                match AssertUnwindSafe(accounts.update(patch)).catch_unwind().await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(error = %e, "failed to merge account patch"),
                    Err(_) => warn!("account patch merge panicked; merging continues"),
                }
            }
        }
    }
    debug!("account merge task exiting");
}
