// ── Test doubles ──
//
// In-memory collaborators shared by the unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CoreError;
use crate::events::MonitorEvent;
use crate::model::{AccountRecord, PartialAccount};
use crate::ports::{
    AccountDirectory, AccountState, Authenticator, CaptchaChallenge, CaptchaResponder,
    CaptchaSurface, CloseHook, EventEmitter, IdentityResolver, LoginRequest, ProcessLifecycle,
};
use crate::state::AuthSignal;

#[derive(Default)]
pub struct FakeLifecycle {
    pub client: AtomicBool,
    pub game_client: AtomicBool,
    pub playing: AtomicBool,
    pub samples: AtomicUsize,
    /// Panic on the next client check, once.
    pub panic_once: AtomicBool,
}

impl ProcessLifecycle for FakeLifecycle {
    fn is_client_running(&self) -> bool {
        self.samples.fetch_add(1, Ordering::SeqCst);
        assert!(
            !self.panic_once.swap(false, Ordering::SeqCst),
            "process table exploded"
        );
        self.client.load(Ordering::SeqCst)
    }

    fn is_game_client_running(&self) -> bool {
        self.game_client.load(Ordering::SeqCst)
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

pub struct FakeAuthenticator {
    /// `None` makes `auth_state` fail.
    pub signal: Mutex<Option<AuthSignal>>,
    pub ready: AtomicBool,
    pub auth_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    pub fail_login: AtomicBool,
    /// Artificial latency for `auth_state`.
    pub delay: Option<Duration>,
}

impl Default for FakeAuthenticator {
    fn default() -> Self {
        Self {
            signal: Mutex::new(Some(AuthSignal::Pending)),
            ready: AtomicBool::new(true),
            auth_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            fail_login: AtomicBool::new(false),
            delay: None,
        }
    }
}

impl FakeAuthenticator {
    pub fn set_signal(&self, signal: Option<AuthSignal>) {
        *self.signal.lock().expect("signal lock") = signal;
    }
}

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn ensure_ready(&self) -> Result<(), CoreError> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::ClientNotRunning {
                reason: "fake".into(),
            })
        }
    }

    async fn auth_state(&self) -> Result<AuthSignal, CoreError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let signal = *self.signal.lock().expect("signal lock");
        signal.ok_or_else(|| CoreError::ConnectionFailed {
            reason: "fake auth failure".into(),
        })
    }

    async fn setup_captcha(&self) -> Result<CaptchaChallenge, CoreError> {
        Ok(CaptchaChallenge {
            kind: "hcaptcha".into(),
            site_key: "site".into(),
            data: Value::Null,
        })
    }

    async fn login(&self, _request: &LoginRequest) -> Result<(), CoreError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_login.load(Ordering::SeqCst) {
            Err(CoreError::AuthenticationFailed {
                message: "bad password".into(),
            })
        } else {
            Ok(())
        }
    }
}

pub struct FakeIdentity {
    pub username: Mutex<String>,
    pub calls: AtomicUsize,
}

impl FakeIdentity {
    pub fn new(username: &str) -> Self {
        Self {
            username: Mutex::new(username.to_owned()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl IdentityResolver for FakeIdentity {
    async fn current_username(&self) -> Result<String, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.username.lock().expect("username lock").clone())
    }
}

#[derive(Default)]
pub struct FakeAccountState {
    pub record: Mutex<Option<AccountRecord>>,
    pub set_username_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub patches: Mutex<Vec<PartialAccount>>,
    /// Panic on the next `update`, once.
    pub panic_once: AtomicBool,
}

impl FakeAccountState {
    pub fn total_calls(&self) -> usize {
        self.set_username_calls.load(Ordering::SeqCst)
            + self.refresh_calls.load(Ordering::SeqCst)
            + self.patches.lock().expect("patches lock").len()
    }
}

#[async_trait]
impl AccountState for FakeAccountState {
    async fn get(&self) -> Option<AccountRecord> {
        self.record.lock().expect("record lock").clone()
    }

    async fn set_username(&self, username: &str) {
        self.set_username_calls.fetch_add(1, Ordering::SeqCst);
        *self.record.lock().expect("record lock") = Some(AccountRecord::new(username));
    }

    async fn update(&self, patch: PartialAccount) -> Result<AccountRecord, CoreError> {
        assert!(
            !self.panic_once.swap(false, Ordering::SeqCst),
            "account store exploded"
        );
        self.patches.lock().expect("patches lock").push(patch.clone());
        let mut guard = self.record.lock().expect("record lock");
        let record = guard.get_or_insert_with(AccountRecord::default);
        record.merge(patch);
        Ok(record.clone())
    }

    async fn refresh(&self) -> Result<AccountRecord, CoreError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .record
            .lock()
            .expect("record lock")
            .clone()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    pub names: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn with(names: &[&str]) -> Self {
        Self {
            names: Mutex::new(names.iter().map(|&n| n.to_owned()).collect()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AccountDirectory for FakeDirectory {
    async fn list_managed(&self) -> Result<Vec<String>, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.names.lock().expect("names lock").clone())
    }

    async fn save(&self, _record: &AccountRecord) -> Result<(), CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingEmitter {
    pub events: Mutex<Vec<MonitorEvent>>,
}

impl RecordingEmitter {
    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn count(&self, pred: impl Fn(&MonitorEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit(&self, event: MonitorEvent) {
        self.events.lock().expect("events lock").push(event);
    }
}

/// Surface that solves every challenge instantly.
#[derive(Default)]
pub struct InstantCaptcha {
    responder: Mutex<Option<CaptchaResponder>>,
}

#[async_trait]
impl CaptchaSurface for InstantCaptcha {
    async fn acquire(
        &self,
        _challenge: &CaptchaChallenge,
        responder: CaptchaResponder,
    ) -> Result<(), CoreError> {
        *self.responder.lock().expect("responder lock") = Some(responder);
        Ok(())
    }

    fn register_close_hook(&self, _hook: CloseHook) -> u64 {
        1
    }

    fn unregister_close_hook(&self, _id: u64) {}

    async fn show(&self) -> Result<(), CoreError> {
        let responder = self.responder.lock().expect("responder lock").clone();
        if let Some(responder) = responder {
            responder.submit_token("token");
        }
        Ok(())
    }

    async fn hide(&self) {}
}

/// Surface that shows the challenge and never answers.
#[derive(Default)]
pub struct SilentCaptcha {
    responder: Mutex<Option<CaptchaResponder>>,
    pub hooks: AtomicUsize,
    pub hidden: AtomicBool,
}

#[async_trait]
impl CaptchaSurface for SilentCaptcha {
    async fn acquire(
        &self,
        _challenge: &CaptchaChallenge,
        responder: CaptchaResponder,
    ) -> Result<(), CoreError> {
        *self.responder.lock().expect("responder lock") = Some(responder);
        Ok(())
    }

    fn register_close_hook(&self, _hook: CloseHook) -> u64 {
        self.hooks.fetch_add(1, Ordering::SeqCst);
        1
    }

    fn unregister_close_hook(&self, _id: u64) {
        self.hooks.fetch_sub(1, Ordering::SeqCst);
    }

    async fn show(&self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn hide(&self) {
        self.hidden.store(true, Ordering::SeqCst);
    }
}
