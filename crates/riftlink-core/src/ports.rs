// ── Collaborator capabilities ──
//
// One trait per role. Components depend on the narrowest capability they
// need, so tests can substitute small fakes and the binary can wire real
// adapters (local API, backend, terminal output).

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;

use crate::error::CoreError;
use crate::events::MonitorEvent;
use crate::model::{AccountRecord, PartialAccount};
use crate::state::AuthSignal;

/// Process presence checks. Cheap and synchronous.
pub trait ProcessLifecycle: Send + Sync {
    /// The launcher (lighter) process.
    fn is_client_running(&self) -> bool;
    /// The game client (heavier) process.
    fn is_game_client_running(&self) -> bool;
    /// The in-match game process.
    fn is_playing(&self) -> bool;
}

/// A captcha challenge handed to the surface that renders it.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptchaChallenge {
    /// Provider name, e.g. `hcaptcha`.
    pub kind: String,
    pub site_key: String,
    /// Provider-specific blob (`rqdata` for hCaptcha).
    pub data: Value,
}

/// Credentials plus the solved captcha token.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: SecretString,
    pub captcha_token: String,
}

/// The launcher's authentication surface.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Make sure the API client is initialized (lazily, on first need).
    async fn ensure_ready(&self) -> Result<(), CoreError>;
    /// Current authentication state.
    async fn auth_state(&self) -> Result<AuthSignal, CoreError>;
    /// Start a login attempt and return the challenge to solve.
    async fn setup_captcha(&self) -> Result<CaptchaChallenge, CoreError>;
    /// Submit credentials and the solved token.
    async fn login(&self, request: &LoginRequest) -> Result<(), CoreError>;
}

/// Remote directory of managed accounts.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Usernames of every managed account.
    async fn list_managed(&self) -> Result<Vec<String>, CoreError>;
    async fn save(&self, record: &AccountRecord) -> Result<(), CoreError>;
}

/// Owner of the canonical account record.
#[async_trait]
pub trait AccountState: Send + Sync {
    async fn get(&self) -> Option<AccountRecord>;
    /// Start tracking `username`. Switching usernames discards the old record.
    async fn set_username(&self, username: &str);
    /// Merge a patch and return the full record.
    async fn update(&self, patch: PartialAccount) -> Result<AccountRecord, CoreError>;
    /// Fetch everything from the client and persist the result.
    async fn refresh(&self) -> Result<AccountRecord, CoreError>;
}

/// Who is logged in right now.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn current_username(&self) -> Result<String, CoreError>;
}

/// Sink for monitor notifications.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: MonitorEvent);
}

/// Hook invoked once if the user closes the captcha surface.
pub type CloseHook = Box<dyn FnOnce() + Send>;

/// Where a captcha surface reports its outcome.
#[derive(Debug, Clone)]
pub struct CaptchaResponder {
    tx: tokio::sync::mpsc::Sender<Result<String, String>>,
}

impl CaptchaResponder {
    pub fn new(tx: tokio::sync::mpsc::Sender<Result<String, String>>) -> Self {
        Self { tx }
    }

    /// Deliver a solved token. Returns `false` if nobody is waiting any more.
    pub fn submit_token(&self, token: impl Into<String>) -> bool {
        self.tx.try_send(Ok(token.into())).is_ok()
    }

    /// Deliver a failure (widget error, user cancellation).
    pub fn report_error(&self, message: impl Into<String>) -> bool {
        self.tx.try_send(Err(message.into())).is_ok()
    }
}

/// UI surface that hosts the captcha widget.
#[async_trait]
pub trait CaptchaSurface: Send + Sync {
    /// Prepare the surface for `challenge`; results go to `responder`.
    async fn acquire(
        &self,
        challenge: &CaptchaChallenge,
        responder: CaptchaResponder,
    ) -> Result<(), CoreError>;
    /// Register a window-closing hook. Returns an id for unregistering.
    fn register_close_hook(&self, hook: CloseHook) -> u64;
    fn unregister_close_hook(&self, id: u64);
    async fn show(&self) -> Result<(), CoreError>;
    async fn hide(&self);
}
