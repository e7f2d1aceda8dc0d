// ── Client state monitor ──
//
// Polls process presence and auth state on a fixed interval, derives the
// authoritative `ClientState`, and drives everything that hangs off a
// transition: managed-flag resets, the one-shot account refresh on login,
// and the start/stop signals for websocket handlers.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use secrecy::SecretString;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::accounts::AccountIdentityCache;
use crate::captcha::{CaptchaFlowCoordinator, StateGate};
use crate::config::MonitorConfig;
use crate::error::CoreError;
use crate::events::MonitorEvent;
use crate::ports::{
    AccountDirectory, AccountState, Authenticator, CaptchaSurface, EventEmitter,
    IdentityResolver, LoginRequest, ProcessLifecycle,
};
use crate::state::{AuthSignal, ClientState, Sample};

/// Every collaborator the monitor talks to.
pub struct MonitorPorts {
    pub lifecycle: Arc<dyn ProcessLifecycle>,
    pub authenticator: Arc<dyn Authenticator>,
    pub identity: Arc<dyn IdentityResolver>,
    pub accounts: Arc<dyn AccountState>,
    pub directory: Arc<dyn AccountDirectory>,
    pub emitter: Arc<dyn EventEmitter>,
    pub captcha_surface: Arc<dyn CaptchaSurface>,
}

/// Resets the single-flight flag when a check finishes or is dropped.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ── ClientStateMonitor ───────────────────────────────────────────────

/// The authoritative client state machine.
///
/// Cheaply cloneable via `Arc<MonitorInner>`.
#[derive(Clone)]
pub struct ClientStateMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    config: MonitorConfig,
    lifecycle: Arc<dyn ProcessLifecycle>,
    authenticator: Arc<dyn Authenticator>,
    identity: Arc<dyn IdentityResolver>,
    accounts: Arc<dyn AccountState>,
    emitter: Arc<dyn EventEmitter>,
    cache: AccountIdentityCache,
    captcha: CaptchaFlowCoordinator,
    state: Mutex<ClientState>,
    managed: AtomicBool,
    /// Set once the account refresh for the current session succeeded.
    account_latch: AtomicBool,
    username: Mutex<Option<String>>,
    checking: AtomicBool,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl ClientStateMonitor {
    pub fn new(config: MonitorConfig, ports: MonitorPorts) -> Self {
        let cache = AccountIdentityCache::new(ports.directory, config.account_cache_ttl);
        let captcha = CaptchaFlowCoordinator::new(
            Arc::clone(&ports.authenticator),
            ports.captcha_surface,
            config.captcha_timeout,
        );

        Self {
            inner: Arc::new(MonitorInner {
                config,
                lifecycle: ports.lifecycle,
                authenticator: ports.authenticator,
                identity: ports.identity,
                accounts: ports.accounts,
                emitter: ports.emitter,
                cache,
                captcha,
                state: Mutex::new(ClientState::Closed),
                managed: AtomicBool::new(false),
                account_latch: AtomicBool::new(false),
                username: Mutex::new(None),
                checking: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &AccountIdentityCache {
        &self.inner.cache
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn state(&self) -> ClientState {
        self.inner.state()
    }

    pub fn is_managed(&self) -> bool {
        self.inner.managed.load(Ordering::Acquire)
    }

    /// Username of the tracked session, if any.
    pub fn username(&self) -> Option<String> {
        self.inner.username().clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the polling task. Calling it again is a no-op.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) || self.is_stopped() {
            return;
        }
        let monitor = self.clone();
        let cancel = self.inner.cancel.clone();
        tokio::spawn(poll_task(monitor, cancel));
        info!(interval = ?self.inner.config.poll_interval, "client state monitor started");
    }

    /// Stop polling. Safe to call any number of times.
    pub fn stop(&self) {
        if !self.inner.cancel.is_cancelled() {
            self.inner.cancel.cancel();
            debug!("client state monitor stopped");
        }
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// One polling tick. Returns `None` if another check was already in
    /// flight (the call is then a no-op), else the state after the tick.
    pub async fn check_client_state(&self) -> Option<ClientState> {
        if self
            .inner
            .checking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("state check already in flight; skipping tick");
            return None;
        }
        let _flight = FlightGuard(&self.inner.checking);

        let previous = self.state();
        let sample = self.sample(previous).await;
        let next = previous.next(&sample);
        trace!(?sample, %previous, %next, "state sample");

        if next != previous && !self.inner.transition_if(previous, next) {
            debug!(%previous, "state changed during sampling; discarding tick");
            return Some(self.state());
        }

        if next == ClientState::LoggedIn && !self.inner.account_latch.load(Ordering::Acquire) {
            if let Err(e) = self.check_and_update_account().await {
                warn!(error = %e, "account update failed; retrying next tick");
            }
        }
        Some(self.state())
    }

    /// Gather the raw signals for one tick.
    pub async fn sample(&self, previous: ClientState) -> Sample {
        let lifecycle = &self.inner.lifecycle;
        let client_running = lifecycle.is_client_running();
        let game_client_running = lifecycle.is_game_client_running();
        let playing = lifecycle.is_playing();

        let auth = if previous.needs_auth_sample(client_running) {
            self.fetch_auth().await
        } else {
            AuthSignal::Unavailable
        };

        Sample {
            client_running,
            game_client_running,
            playing,
            auth,
        }
    }

    async fn fetch_auth(&self) -> AuthSignal {
        let auth = &self.inner.authenticator;
        if let Err(e) = auth.ensure_ready().await {
            debug!(error = %e, "local API not ready");
            return AuthSignal::Unavailable;
        }
        match auth.auth_state().await {
            Ok(signal) => signal,
            Err(e) => {
                debug!(error = %e, "auth state unavailable");
                AuthSignal::Unavailable
            }
        }
    }

    // ── Account tracking ─────────────────────────────────────────────

    /// Resolve the logged-in account and start tracking it.
    ///
    /// Skips silently when the API is not ready or when the same account
    /// is already tracked.
    pub async fn check_and_update_account(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        if let Err(e) = inner.authenticator.ensure_ready().await {
            debug!(error = %e, "local API not ready; skipping account check");
            return Ok(());
        }

        let username = inner.identity.current_username().await?;
        if inner.account_latch.load(Ordering::Acquire)
            && inner.username().as_deref() == Some(username.as_str())
        {
            return Ok(());
        }

        inner.accounts.set_username(&username).await;
        *inner.username() = Some(username.clone());

        let managed = inner.cache.is_managed(&username).await;
        inner.set_managed(managed);

        inner.accounts.refresh().await?;

        if self.state() != ClientState::LoggedIn {
            debug!(%username, "session ended during refresh");
            return Ok(());
        }
        inner.account_latch.store(true, Ordering::Release);
        info!(%username, managed, "account monitoring started");
        inner
            .emitter
            .emit(MonitorEvent::MonitoringStarted { username });
        inner.emitter.emit(MonitorEvent::StartWebsocketHandlers);
        Ok(())
    }

    // ── Login ────────────────────────────────────────────────────────

    /// Solve a captcha and submit credentials.
    ///
    /// Requires `LoginReady`. On success the state is `WaitingLogin` until a
    /// tick sees the session; on failure it reverts to `LoginReady`.
    pub async fn login(&self, username: &str, password: SecretString) -> Result<(), CoreError> {
        let token = self.inner.captcha.run(&*self.inner).await?;

        if !self
            .inner
            .transition_if(ClientState::WaitingCaptcha, ClientState::WaitingLogin)
        {
            return Err(CoreError::InvalidState {
                operation: "login".into(),
                state: self.state().to_string(),
            });
        }

        let request = LoginRequest {
            username: username.to_owned(),
            password,
            captcha_token: token,
        };
        match self.inner.authenticator.login(&request).await {
            Ok(()) => {
                info!(username, "credentials accepted; waiting for session");
                Ok(())
            }
            Err(e) => {
                self.inner
                    .transition_if(ClientState::WaitingLogin, ClientState::LoginReady);
                Err(e)
            }
        }
    }

    /// Abandon a pending login: abort a running captcha flow and put
    /// `WaitingCaptcha` or `WaitingLogin` back to `LoginReady`. Returns
    /// whether anything was cancelled.
    pub fn cancel_login(&self) -> bool {
        let aborted = self.inner.captcha.cancel();
        let reverted = self
            .inner
            .transition_if(ClientState::WaitingCaptcha, ClientState::LoginReady)
            || self
                .inner
                .transition_if(ClientState::WaitingLogin, ClientState::LoginReady);
        aborted || reverted
    }
}

// ── State transitions ────────────────────────────────────────────────

impl MonitorInner {
    fn username(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.username.lock().expect("username lock poisoned")
    }

    fn set_managed(&self, managed: bool) {
        if self.managed.swap(managed, Ordering::AcqRel) != managed {
            debug!(managed, "managed flag changed");
            self.emitter.emit(MonitorEvent::ManagedAccountChanged(managed));
        }
    }

    /// Side effects of an actual state change.
    fn on_transition(&self, old: ClientState, new: ClientState) {
        info!(from = %old, to = %new, "client state changed");
        self.emitter.emit(MonitorEvent::ClientStateChanged(new));

        if matches!(new, ClientState::Closed | ClientState::LoginReady) {
            self.set_managed(false);
        }
        if old == ClientState::LoggedIn {
            self.account_latch.store(false, Ordering::Release);
            *self.username() = None;
            self.emitter.emit(MonitorEvent::StopWebsocketHandlers);
        }
    }
}

impl StateGate for MonitorInner {
    fn state(&self) -> ClientState {
        *self.state.lock().expect("state lock poisoned")
    }

    /// Side effects run under the state lock so observers see transitions
    /// in the order they happened.
    fn transition_if(&self, from: ClientState, to: ClientState) -> bool {
        let mut state = self.state.lock().expect("state lock poisoned");
        if *state != from {
            return false;
        }
        *state = to;
        if from != to {
            self.on_transition(from, to);
        }
        true
    }
}

// ── Background task ──────────────────────────────────────────────────

async fn poll_task(monitor: ClientStateMonitor, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(monitor.inner.config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let tick = AssertUnwindSafe(monitor.check_client_state()).catch_unwind();
                if tick.await.is_err() {
                    warn!("state check panicked; polling continues");
                }
            }
        }
    }
    debug!("poll task exiting");
}
