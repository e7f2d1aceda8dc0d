// ── Captcha flow ──
//
// Single-flight, bounded sub-flow of a login attempt: move the client to
// `WaitingCaptcha`, have the authenticator produce a challenge, put it on a
// surface and wait for a token, an error, a manual close or the deadline.
// The surface is always hidden and the close hook always removed, even when
// the flow is cancelled or its future dropped; any failure reverts the state
// to `LoginReady`.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::ports::{Authenticator, CaptchaResponder, CaptchaSurface};
use crate::state::ClientState;

/// Conditional state writes the flow needs from its owner.
pub trait StateGate: Send + Sync {
    fn state(&self) -> ClientState;
    /// Replace `from` with `to`; `false` if the current state is not `from`.
    fn transition_if(&self, from: ClientState, to: ClientState) -> bool;
}

/// Releases the single-flight latch on every exit path, including when the
/// flow future is dropped mid-await.
struct LatchGuard<'a>(&'a AtomicBool);

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Undoes an unfinished flow when its future is dropped: removes the close
/// hook, hides the surface and reverts `WaitingCaptcha` to `LoginReady`.
/// Disarmed by [`FlowCleanup::finish`].
struct FlowCleanup<'a> {
    gate: &'a dyn StateGate,
    surface: Arc<dyn CaptchaSurface>,
    hook: Option<u64>,
    acquired: bool,
    armed: bool,
}

impl<'a> FlowCleanup<'a> {
    fn new(gate: &'a dyn StateGate, surface: Arc<dyn CaptchaSurface>) -> Self {
        Self {
            gate,
            surface,
            hook: None,
            acquired: false,
            armed: true,
        }
    }

    async fn finish(mut self, succeeded: bool) {
        if let Some(id) = self.hook.take() {
            self.surface.unregister_close_hook(id);
        }
        if self.acquired {
            self.surface.hide().await;
        }
        if !succeeded {
            self.gate
                .transition_if(ClientState::WaitingCaptcha, ClientState::LoginReady);
        }
        self.armed = false;
    }
}

impl Drop for FlowCleanup<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(id) = self.hook.take() {
            self.surface.unregister_close_hook(id);
        }
        if self.acquired {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let surface = Arc::clone(&self.surface);
                handle.spawn(async move { surface.hide().await });
            }
        }
        if self
            .gate
            .transition_if(ClientState::WaitingCaptcha, ClientState::LoginReady)
        {
            debug!("captcha flow abandoned; state reverted");
        }
    }
}

pub struct CaptchaFlowCoordinator {
    authenticator: Arc<dyn Authenticator>,
    surface: Arc<dyn CaptchaSurface>,
    timeout: Duration,
    in_flight: AtomicBool,
    /// Cancels the flow currently in flight.
    cancel: Mutex<CancellationToken>,
}

impl CaptchaFlowCoordinator {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        surface: Arc<dyn CaptchaSurface>,
        timeout: Duration,
    ) -> Self {
        Self {
            authenticator,
            surface,
            timeout,
            in_flight: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Abort the flow in flight, if any. It fails with
    /// [`CoreError::Cancelled`] and reverts the state itself.
    pub fn cancel(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.cancel.lock().expect("cancel lock poisoned").cancel();
        true
    }

    /// Run the flow and return the solved token.
    ///
    /// On success the state is left at `WaitingCaptcha` for the caller to
    /// advance. A concurrent second call fails with
    /// [`CoreError::FlowInProgress`] without touching state. Dropping the
    /// returned future mid-flow cleans up like a failure does.
    pub async fn run(&self, gate: &dyn StateGate) -> Result<String, CoreError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CoreError::FlowInProgress { flow: "captcha" });
        }
        let _latch = LatchGuard(&self.in_flight);

        let cancel = CancellationToken::new();
        *self.cancel.lock().expect("cancel lock poisoned") = cancel.clone();

        if !gate.transition_if(ClientState::LoginReady, ClientState::WaitingCaptcha) {
            return Err(CoreError::InvalidState {
                operation: "captcha".into(),
                state: gate.state().to_string(),
            });
        }

        let mut cleanup = FlowCleanup::new(gate, Arc::clone(&self.surface));
        let result = self.solve(&mut cleanup, &cancel).await;
        match &result {
            Ok(_) => info!("captcha solved"),
            Err(e) => warn!(error = %e, "captcha flow failed"),
        }
        cleanup.finish(result.is_ok()).await;
        result
    }

    async fn solve(
        &self,
        cleanup: &mut FlowCleanup<'_>,
        cancel: &CancellationToken,
    ) -> Result<String, CoreError> {
        let challenge = self.authenticator.setup_captcha().await?;
        debug!(kind = %challenge.kind, "captcha challenge ready");

        let (tx, mut rx) = mpsc::channel(4);
        self.surface
            .acquire(&challenge, CaptchaResponder::new(tx))
            .await?;
        cleanup.acquired = true;

        let (close_tx, close_rx) = oneshot::channel::<()>();
        cleanup.hook = Some(self.surface.register_close_hook(Box::new(move || {
            let _ = close_tx.send(());
        })));

        self.surface.show().await?;

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(CoreError::Cancelled {
                reason: "captcha flow cancelled".into(),
            }),
            msg = rx.recv() => match msg {
                Some(Ok(token)) => Ok(token),
                Some(Err(message)) => Err(CoreError::Captcha { message }),
                None => Err(CoreError::Captcha {
                    message: "captcha surface went away".into(),
                }),
            },
            Ok(()) = close_rx => Err(CoreError::Cancelled {
                reason: "captcha window closed".into(),
            }),
            () = &mut deadline => Err(CoreError::Timeout {
                what: "captcha".into(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }
}
