//! WebSocket subscription manager with timer-driven reconnect.
//!
//! Owns the single live socket to the local API's event bus. A background
//! ticker re-dials whenever the client process is up but no socket answers a
//! ping; every successful dial replays the whole subscription set, so
//! callers can [`subscribe`](SubscriptionManager::subscribe) at any time
//! without caring whether a connection exists yet.
//!
//! # Example
//!
//! ```rust,ignore
//! let manager = SubscriptionManager::new(connection, router, WebSocketConfig::default());
//! manager.subscribe("/lol-inventory/v1/wallet").await;
//! manager.start();
//! // ...
//! manager.stop().await;
//! ```

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::Error;
use crate::frame::{decode_frame, subscribe_frame, unsubscribe_frame};
use crate::local::LocalApiConnection;
use crate::router::EventRouter;
use crate::transport::{basic_auth_value, insecure_rustls_config};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── WebSocketConfig ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// How often the reconnect ticker checks the socket. Default: 5s.
    pub reconnect_interval: Duration,
    /// Deadline for the liveness ping write. Default: 1s.
    pub ping_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(1),
        }
    }
}

// ── FrameSink ────────────────────────────────────────────────────────

/// Write half of an event-bus connection.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), Error>;
    async fn ping(&mut self) -> Result<(), Error>;
    async fn close(&mut self);
}

struct WsSink(SplitSink<WsStream, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), Error> {
        self.0
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))
    }

    async fn ping(&mut self) -> Result<(), Error> {
        self.0
            .send(Message::Ping(Default::default()))
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.0.close().await;
    }
}

// ── Connection slot ──────────────────────────────────────────────────

/// Subscription set plus the live writer. Guarded by one lock so a
/// reconnect replay cannot interleave with a concurrent subscribe.
#[derive(Default)]
struct Slot {
    /// path → sent on the current connection.
    subscriptions: BTreeMap<String, bool>,
    sink: Option<Box<dyn FrameSink>>,
    /// Bumped on every attach so a stale read loop cannot clear a newer socket.
    generation: u64,
    /// Cancels the read loop of the current connection.
    conn_cancel: Option<CancellationToken>,
}

impl Slot {
    fn drop_connection(&mut self) {
        self.sink = None;
        if let Some(token) = self.conn_cancel.take() {
            token.cancel();
        }
        for active in self.subscriptions.values_mut() {
            *active = false;
        }
    }
}

// ── SubscriptionManager ──────────────────────────────────────────────

/// Manages the event-bus socket, the subscription set and reconnects.
///
/// Cheaply cloneable; all clones share one connection slot.
#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<Inner>,
}

struct Inner {
    connection: Arc<LocalApiConnection>,
    router: Arc<EventRouter>,
    config: WebSocketConfig,
    slot: Mutex<Slot>,
    cancel: CancellationToken,
    started: AtomicBool,
    connects: AtomicU64,
}

impl SubscriptionManager {
    pub fn new(
        connection: Arc<LocalApiConnection>,
        router: Arc<EventRouter>,
        config: WebSocketConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                connection,
                router,
                config,
                slot: Mutex::new(Slot::default()),
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
                connects: AtomicU64::new(0),
            }),
        }
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.inner.router
    }

    /// Number of successful connects since creation.
    pub fn connect_count(&self) -> u64 {
        self.inner.connects.load(Ordering::Relaxed)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the reconnect ticker. Calling it again is a no-op.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) || self.inner.cancel.is_cancelled() {
            return;
        }
        let manager = self.clone();
        tokio::spawn(async move { manager.reconnect_loop().await });
        debug!("websocket reconnect ticker started");
    }

    /// Stop the ticker and close the socket. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        self.detach().await;
    }

    async fn reconnect_loop(&self) {
        let mut interval = tokio::time::interval(self.inner.config.reconnect_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = self.inner.cancel.cancelled() => break,
                _ = interval.tick() => {
                    if AssertUnwindSafe(self.tick()).catch_unwind().await.is_err() {
                        warn!("websocket reconnect check panicked; ticker continues");
                    }
                }
            }
        }
        debug!("websocket reconnect ticker exiting");
    }

    /// One reconnect check: dial only if the process runs and no socket answers.
    async fn tick(&self) {
        if !self.inner.connection.is_process_running() {
            trace!("client not running; skipping websocket connect");
            return;
        }
        if self.is_connected().await {
            return;
        }
        if let Err(e) = self.connect_once().await {
            if e.is_not_running() {
                debug!(error = %e, "websocket connect skipped");
            } else {
                warn!(error = %e, "websocket connect failed");
            }
        }
    }

    // ── Connection ───────────────────────────────────────────────────

    /// Dial the event bus once, replay subscriptions and spawn the read loop.
    pub async fn connect_once(&self) -> Result<(), Error> {
        self.inner.connection.ensure_initialized().await?;
        let (base_url, credentials) = match (
            self.inner.connection.base_url(),
            self.inner.connection.active_credentials(),
        ) {
            (Some(url), Some(creds)) => (url, creds),
            _ => return Err(Error::NotInitialized),
        };

        let ws_url = websocket_url(&base_url)?;
        info!(url = %ws_url, "connecting to event bus");

        let uri: tungstenite::http::Uri = ws_url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;
        let request = ClientRequestBuilder::new(uri)
            .with_header("Authorization", basic_auth_value(&credentials.auth_token));

        let connector = if ws_url.scheme() == "wss" {
            Some(Connector::Rustls(insecure_rustls_config()?))
        } else {
            None
        };

        let (stream, _response) =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector)
                .await
                .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        let (write, read) = stream.split();
        let (generation, conn_cancel) = self.attach(Box::new(WsSink(write))).await?;

        let manager = self.clone();
        tokio::spawn(async move {
            manager.read_loop(read, generation, conn_cancel).await;
        });

        self.inner.connects.fetch_add(1, Ordering::Relaxed);
        info!("event bus connected");
        Ok(())
    }

    /// Install `sink` as the live connection and replay every tracked path.
    ///
    /// Any previous connection is dropped first. Returns the new generation
    /// and the token that cancels its read loop.
    pub async fn attach(
        &self,
        sink: Box<dyn FrameSink>,
    ) -> Result<(u64, CancellationToken), Error> {
        let mut slot = self.inner.slot.lock().await;
        if let Some(mut old) = slot.sink.take() {
            old.close().await;
        }
        slot.drop_connection();

        slot.generation += 1;
        let generation = slot.generation;
        let conn_cancel = self.inner.cancel.child_token();
        slot.conn_cancel = Some(conn_cancel.clone());
        slot.sink = Some(sink);

        let paths: Vec<String> = slot.subscriptions.keys().cloned().collect();
        for path in paths {
            let sent = match slot.sink.as_mut() {
                Some(sink) => sink.send_text(subscribe_frame(&path)).await,
                None => Err(Error::NotConnected),
            };
            if let Err(e) = sent {
                warn!(path = %path, error = %e, "subscription replay failed");
                slot.drop_connection();
                return Err(e);
            }
            slot.subscriptions.insert(path, true);
        }
        debug!(generation, replayed = slot.subscriptions.len(), "subscriptions replayed");
        Ok((generation, conn_cancel))
    }

    /// Close and forget the current connection, keeping the subscription set.
    pub async fn detach(&self) {
        let mut slot = self.inner.slot.lock().await;
        if let Some(mut sink) = slot.sink.take() {
            sink.close().await;
            debug!("event bus connection closed");
        }
        slot.drop_connection();
    }

    async fn drop_generation(&self, generation: u64) {
        let mut slot = self.inner.slot.lock().await;
        if slot.generation == generation {
            slot.drop_connection();
        }
    }

    /// Operational liveness: a ping must be written within the ping timeout.
    /// A failed or slow write drops the connection.
    pub async fn is_connected(&self) -> bool {
        let mut slot = self.inner.slot.lock().await;
        let Some(sink) = slot.sink.as_mut() else {
            return false;
        };
        match tokio::time::timeout(self.inner.config.ping_timeout, sink.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(error = %e, "liveness ping failed");
                slot.drop_connection();
                false
            }
            Err(_) => {
                debug!("liveness ping timed out");
                slot.drop_connection();
                false
            }
        }
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Track `path`; send the subscribe frame now if a socket is live,
    /// otherwise on the next connect.
    pub async fn subscribe(&self, path: &str) {
        let mut slot = self.inner.slot.lock().await;
        slot.subscriptions.entry(path.to_owned()).or_insert(false);

        let Some(sink) = slot.sink.as_mut() else {
            debug!(path, "subscription queued until connected");
            return;
        };
        match sink.send_text(subscribe_frame(path)).await {
            Ok(()) => {
                slot.subscriptions.insert(path.to_owned(), true);
                debug!(path, "subscribed");
            }
            Err(e) => {
                warn!(path, error = %e, "subscribe write failed; dropping connection");
                slot.drop_connection();
            }
        }
    }

    /// Forget `path`, remove its route and send the unsubscribe frame if live.
    pub async fn unsubscribe(&self, path: &str) {
        let mut slot = self.inner.slot.lock().await;
        slot.subscriptions.remove(path);
        self.inner.router.delete_handler(path);

        let Some(sink) = slot.sink.as_mut() else {
            return;
        };
        if let Err(e) = sink.send_text(unsubscribe_frame(path)).await {
            warn!(path, error = %e, "unsubscribe write failed; dropping connection");
            slot.drop_connection();
        } else {
            debug!(path, "unsubscribed");
        }
    }

    pub async fn tracked_paths(&self) -> Vec<String> {
        self.inner.slot.lock().await.subscriptions.keys().cloned().collect()
    }

    /// Tracked paths with their "sent on this connection" flag.
    pub async fn subscriptions(&self) -> Vec<(String, bool)> {
        let slot = self.inner.slot.lock().await;
        slot.subscriptions
            .iter()
            .map(|(p, active)| (p.clone(), *active))
            .collect()
    }

    // ── Read loop ────────────────────────────────────────────────────

    async fn read_loop(
        &self,
        mut read: SplitStream<WsStream>,
        generation: u64,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(cf) = frame {
                            info!(code = %cf.code, reason = %cf.reason, "event bus closed by peer");
                        } else {
                            info!("event bus closed by peer");
                        }
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/Pong/Binary -- tungstenite answers pings itself.
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "event bus read failed");
                        break;
                    }
                    None => {
                        info!("event bus stream ended");
                        break;
                    }
                },
            }
        }
        self.drop_generation(generation).await;
        debug!(generation, "read loop exiting");
    }

    /// Decode one text frame and dispatch it. Malformed frames are dropped.
    pub fn handle_text(&self, text: &str) {
        match decode_frame(text) {
            Ok(Some(event)) => {
                trace!(uri = %event.uri, code = event.event_type.code(), "event");
                self.inner.router.dispatch(&event);
            }
            Ok(None) => trace!("non-event frame"),
            Err(e) => warn!(error = %e, "dropping malformed frame"),
        }
    }
}

/// `https://host:port` → `wss://host:port`, `http` → `ws`.
pub fn websocket_url(base: &Url) -> Result<Url, Error> {
    let scheme = match base.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(Error::WebSocketConnect(format!(
                "unsupported scheme {other:?}"
            )));
        }
    };
    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|()| Error::WebSocketConnect(format!("cannot use scheme {scheme}")))?;
    Ok(url)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::discovery::{CredentialDiscovery, ProcessInfo, ProcessTarget, StaticProcessTable};
    use crate::frame::ApiEvent;
    use crate::transport::TransportConfig;

    #[derive(Clone, Default)]
    struct Recording {
        sent: Arc<StdMutex<Vec<String>>>,
        fail_ping: Arc<AtomicBool>,
        panic_ping_once: Arc<AtomicBool>,
        pings: Arc<AtomicU64>,
        closed: Arc<AtomicBool>,
    }

    impl Recording {
        fn sent(&self) -> Vec<String> {
            self.sent.lock().expect("sent lock").clone()
        }

        fn pings(&self) -> u64 {
            self.pings.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FrameSink for Recording {
        async fn send_text(&mut self, text: String) -> Result<(), Error> {
            self.sent.lock().expect("sent lock").push(text);
            Ok(())
        }

        async fn ping(&mut self) -> Result<(), Error> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            assert!(
                !self.panic_ping_once.swap(false, Ordering::SeqCst),
                "socket writer exploded"
            );
            if self.fail_ping.load(Ordering::SeqCst) {
                Err(Error::NotConnected)
            } else {
                Ok(())
            }
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn manager() -> SubscriptionManager {
        manager_with(StaticProcessTable::default(), None)
    }

    fn manager_with(table: StaticProcessTable, base_url: Option<Url>) -> SubscriptionManager {
        let discovery = CredentialDiscovery::with_table(ProcessTarget::league_client(), Arc::new(table));
        let mut connection = LocalApiConnection::new(discovery, TransportConfig::default());
        if let Some(url) = base_url {
            connection = connection.with_base_url(url);
        }
        SubscriptionManager::new(
            Arc::new(connection),
            Arc::new(EventRouter::new()),
            WebSocketConfig::default(),
        )
    }

    fn league_running() -> StaticProcessTable {
        StaticProcessTable(vec![ProcessInfo {
            pid: 7,
            name: "LeagueClientUx".into(),
            cmd: vec![
                "--app-port=50123".into(),
                "--remoting-auth-token=tok".into(),
                "--app-pid=7".into(),
            ],
        }])
    }

    async fn mock_client() -> (MockServer, Url) {
        let server = MockServer::start().await;
        let url = Url::parse(&server.uri()).expect("mock url");
        (server, url)
    }

    #[tokio::test]
    async fn subscribe_without_connection_only_records() {
        let manager = manager();
        manager.subscribe("/lol-inventory/v1/wallet").await;

        assert!(!manager.is_connected().await);
        assert_eq!(
            manager.subscriptions().await,
            vec![("/lol-inventory/v1/wallet".to_owned(), false)]
        );
    }

    #[tokio::test]
    async fn replay_sends_each_path_exactly_once_per_connection() {
        let manager = manager();
        manager.subscribe("/a").await;
        manager.subscribe("/b").await;

        let first = Recording::default();
        manager.attach(Box::new(first.clone())).await.expect("attach");
        assert_eq!(
            first.sent(),
            vec![subscribe_frame("/a"), subscribe_frame("/b")]
        );

        // Simulated disconnect / reconnect.
        manager.detach().await;
        assert!(first.closed.load(Ordering::SeqCst));
        assert!(manager.subscriptions().await.iter().all(|(_, active)| !active));

        let second = Recording::default();
        manager.attach(Box::new(second.clone())).await.expect("attach");
        assert_eq!(
            second.sent(),
            vec![subscribe_frame("/a"), subscribe_frame("/b")]
        );
        assert_eq!(first.sent().len(), 2);
        assert!(manager.subscriptions().await.iter().all(|(_, active)| *active));
    }

    #[tokio::test]
    async fn live_subscribe_and_unsubscribe_send_frames() {
        let manager = manager();
        let sink = Recording::default();
        manager.attach(Box::new(sink.clone())).await.expect("attach");
        manager.router().register_handler("/x", |_: &ApiEvent| {});

        manager.subscribe("/x").await;
        manager.unsubscribe("/x").await;

        assert_eq!(
            sink.sent(),
            vec![
                r#"[5,"OnJsonApiEvent_x"]"#.to_owned(),
                r#"[6,"/x"]"#.to_owned(),
            ]
        );
        assert!(manager.tracked_paths().await.is_empty());
        assert!(manager.router().is_empty());
    }

    #[tokio::test]
    async fn failed_ping_drops_connection() {
        let manager = manager();
        let sink = Recording::default();
        manager.attach(Box::new(sink.clone())).await.expect("attach");
        assert!(manager.is_connected().await);

        sink.fail_ping.store(true, Ordering::SeqCst);
        assert!(!manager.is_connected().await);
        // Slot is empty now; a later subscribe is only recorded.
        manager.subscribe("/later").await;
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn stale_generation_does_not_clear_new_connection() {
        let manager = manager();
        let (old_gen, old_cancel) = manager
            .attach(Box::new(Recording::default()))
            .await
            .expect("attach");
        manager
            .attach(Box::new(Recording::default()))
            .await
            .expect("attach");
        assert!(old_cancel.is_cancelled());

        manager.drop_generation(old_gen).await;
        assert!(manager.is_connected().await);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let manager = manager();
        manager.start();
        manager.stop().await;
        manager.stop().await;
        manager.start();
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn handle_text_dispatches_and_survives_garbage() {
        let manager = manager();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        manager.router().register_handler("u", move |e: &ApiEvent| {
            sink.lock().expect("seen lock").push(e.event_type.code());
        });

        manager.handle_text("garbage");
        manager.handle_text(r#"[8, "topic", {"uri":"u","eventType":"Create","data":{}}]"#);
        manager.handle_text(r#"[8, "topic", {"uri":"u","eventType":"Bogus","data":{}}]"#);

        assert_eq!(*seen.lock().expect("seen lock"), vec![0, -1]);
    }

    #[test]
    fn websocket_url_maps_schemes() {
        let https = Url::parse("https://127.0.0.1:5000").expect("url");
        assert_eq!(websocket_url(&https).expect("wss").as_str(), "wss://127.0.0.1:5000/");
        let http = Url::parse("http://127.0.0.1:5000").expect("url");
        assert_eq!(websocket_url(&http).expect("ws").scheme(), "ws");
    }

    // ── Reconnect ticker ─────────────────────────────────────────────

    #[tokio::test]
    async fn tick_does_not_dial_without_client_process() {
        let (server, url) = mock_client().await;
        let manager = manager_with(StaticProcessTable::default(), Some(url));
        manager.subscribe("/a").await;
        let sink = Recording::default();
        sink.fail_ping.store(true, Ordering::SeqCst);
        manager.attach(Box::new(sink.clone())).await.expect("attach");

        manager.tick().await;

        assert_eq!(sink.pings(), 0);
        assert_eq!(manager.connect_count(), 0);
        assert_eq!(sink.sent(), vec![subscribe_frame("/a")]);
        assert!(server.received_requests().await.expect("recording").is_empty());
    }

    #[tokio::test]
    async fn tick_keeps_a_socket_that_answers_pings() {
        let (server, url) = mock_client().await;
        let manager = manager_with(league_running(), Some(url));
        manager.subscribe("/a").await;
        let sink = Recording::default();
        manager.attach(Box::new(sink.clone())).await.expect("attach");

        manager.tick().await;
        manager.tick().await;

        assert_eq!(sink.pings(), 2);
        assert_eq!(manager.connect_count(), 0);
        assert_eq!(sink.sent(), vec![subscribe_frame("/a")]);
        assert!(manager.subscriptions().await.iter().all(|(_, active)| *active));
        assert!(server.received_requests().await.expect("recording").is_empty());
    }

    #[tokio::test]
    async fn tick_redials_after_a_failed_ping() {
        let (server, url) = mock_client().await;
        Mock::given(method("GET"))
            .and(path("/riotclient/app-name"))
            .respond_with(ResponseTemplate::new(200).set_body_json("LeagueClient"))
            .mount(&server)
            .await;
        let manager = manager_with(league_running(), Some(url));
        manager.subscribe("/a").await;
        let sink = Recording::default();
        sink.fail_ping.store(true, Ordering::SeqCst);
        manager.attach(Box::new(sink.clone())).await.expect("attach");

        manager.tick().await;

        assert_eq!(sink.pings(), 1);
        assert!(manager.subscriptions().await.iter().all(|(_, active)| !active));
        let requests = server.received_requests().await.expect("recording");
        assert!(requests.iter().any(|r| r.url.path() == "/riotclient/app-name"));
        assert!(
            requests.iter().any(|r| r.headers.contains_key("sec-websocket-key")),
            "expected a websocket handshake attempt"
        );
        // The mock answers the handshake with 404, so no connection counts.
        assert_eq!(manager.connect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_ticker_survives_a_panicking_check() {
        let manager = manager_with(league_running(), None);
        let sink = Recording::default();
        sink.panic_ping_once.store(true, Ordering::SeqCst);
        manager.attach(Box::new(sink.clone())).await.expect("attach");

        manager.start();
        tokio::time::sleep(Duration::from_secs(12)).await;

        assert!(sink.pings() >= 3, "ticker stopped after the panic: {} pings", sink.pings());
        assert!(manager.is_connected().await);
        manager.stop().await;
    }
}
