// ── Concrete collaborators ──
//
// Port implementations backed by the real local API, the OS process table
// and the account backend. The binary wires these into the monitor; tests
// use the in-memory fakes instead.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use riftlink_api::{BackendClient, LocalApiConnection, ProcessTable, ProcessTarget};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::CoreError;
use crate::model::AccountRecord;
use crate::ports::{
    AccountDirectory, Authenticator, CaptchaChallenge, IdentityResolver, LoginRequest,
    ProcessLifecycle,
};
use crate::state::AuthSignal;

const AUTHENTICATION_PATH: &str = "/rso-authenticator/v1/authentication";
const IDENTITY_START_PATH: &str = "/rso-authenticator/v1/authentication/riot-identity/start";
const IDENTITY_COMPLETE_PATH: &str = "/rso-authenticator/v1/authentication/riot-identity/complete";
const USERINFO_PATH: &str = "/rso-auth/v1/authorization/userinfo";

/// Process name of a running match.
pub const GAME_PROCESS: &str = "League of Legends";

// ── Process lifecycle ────────────────────────────────────────────────

/// [`ProcessLifecycle`] over an OS process table.
pub struct LocalProcessLifecycle {
    table: Arc<dyn ProcessTable>,
    client_names: Vec<String>,
    game_client_names: Vec<String>,
    game_names: Vec<String>,
}

impl LocalProcessLifecycle {
    pub fn new(table: Arc<dyn ProcessTable>) -> Self {
        Self {
            table,
            client_names: ProcessTarget::riot_client().process_names,
            game_client_names: ProcessTarget::league_client().process_names,
            game_names: vec![GAME_PROCESS.to_owned()],
        }
    }
}

impl ProcessLifecycle for LocalProcessLifecycle {
    fn is_client_running(&self) -> bool {
        self.table.is_running(&self.client_names)
    }

    fn is_game_client_running(&self) -> bool {
        self.table.is_running(&self.game_client_names)
    }

    fn is_playing(&self) -> bool {
        self.table.is_running(&self.game_names)
    }
}

// ── Authenticator ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct AuthenticationBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StartBody {
    #[serde(default)]
    captcha: Option<CaptchaBody>,
}

#[derive(Debug, Default, Deserialize)]
struct CaptchaBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    hcaptcha: Option<HcaptchaBody>,
}

#[derive(Debug, Default, Deserialize)]
struct HcaptchaBody {
    #[serde(default)]
    key: String,
    #[serde(default)]
    data: Value,
}

/// [`Authenticator`] backed by the launcher's local API.
pub struct LocalApiAuthenticator {
    connection: Arc<LocalApiConnection>,
    language: String,
}

impl LocalApiAuthenticator {
    pub fn new(connection: Arc<LocalApiConnection>) -> Self {
        Self {
            connection,
            language: "en_US".into(),
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

#[async_trait]
impl Authenticator for LocalApiAuthenticator {
    async fn ensure_ready(&self) -> Result<(), CoreError> {
        self.connection.ensure_initialized().await?;
        Ok(())
    }

    async fn auth_state(&self) -> Result<AuthSignal, CoreError> {
        match self
            .connection
            .get_json::<AuthenticationBody>(AUTHENTICATION_PATH)
            .await
        {
            Ok(body) if body.kind == "success" => Ok(AuthSignal::Success),
            Ok(body) => {
                debug!(kind = %body.kind, "auth pending");
                Ok(AuthSignal::Pending)
            }
            // No authentication session yet: the launcher sits at its login screen.
            Err(e) if e.is_not_found() => Ok(AuthSignal::Pending),
            Err(e) => Err(e.into()),
        }
    }

    async fn setup_captcha(&self) -> Result<CaptchaChallenge, CoreError> {
        let body = json!({
            "language": self.language,
            "productId": "riot-client",
            "state": "auth",
        });
        let start: StartBody = self.connection.post_json(IDENTITY_START_PATH, &body).await?;

        let captcha = start.captcha.ok_or_else(|| CoreError::Captcha {
            message: "login start returned no captcha".into(),
        })?;
        let hcaptcha = captcha.hcaptcha.ok_or_else(|| CoreError::Captcha {
            message: format!("unsupported captcha type '{}'", captcha.kind),
        })?;

        Ok(CaptchaChallenge {
            kind: if captcha.kind.is_empty() {
                "hcaptcha".into()
            } else {
                captcha.kind
            },
            site_key: hcaptcha.key,
            data: hcaptcha.data,
        })
    }

    async fn login(&self, request: &LoginRequest) -> Result<(), CoreError> {
        let body = json!({
            "username": request.username,
            "password": request.password.expose_secret(),
            "captcha": format!("hcaptcha {}", request.captcha_token),
            "remember": false,
            "language": self.language,
        });
        let result: AuthenticationBody = self
            .connection
            .post_json(IDENTITY_COMPLETE_PATH, &body)
            .await?;

        if result.kind == "success" {
            Ok(())
        } else {
            Err(CoreError::AuthenticationFailed {
                message: result.error.unwrap_or(result.kind),
            })
        }
    }
}

// ── Identity ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UserInfoEnvelope {
    #[serde(rename = "userInfo")]
    user_info: String,
}

#[derive(Debug, Default, Deserialize)]
struct UserInfoClaims {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    acct: Option<AcctClaims>,
}

#[derive(Debug, Default, Deserialize)]
struct AcctClaims {
    #[serde(default)]
    game_name: Option<String>,
}

/// Resolves the logged-in username from the signed userinfo token.
pub struct LocalIdentityResolver {
    connection: Arc<LocalApiConnection>,
}

impl LocalIdentityResolver {
    pub fn new(connection: Arc<LocalApiConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl IdentityResolver for LocalIdentityResolver {
    async fn current_username(&self) -> Result<String, CoreError> {
        let envelope: UserInfoEnvelope = self.connection.get_json(USERINFO_PATH).await?;
        username_from_token(&envelope.user_info)
    }
}

/// Extract the username from a JWT's payload segment.
pub fn username_from_token(token: &str) -> Result<String, CoreError> {
    let payload = token.split('.').nth(1).ok_or_else(|| CoreError::Api {
        message: "userinfo is not a JWT".into(),
        status: None,
    })?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| CoreError::Api {
            message: format!("userinfo payload is not base64url: {e}"),
            status: None,
        })?;
    let claims: UserInfoClaims = serde_json::from_slice(&bytes).map_err(|e| CoreError::Api {
        message: format!("userinfo payload is not JSON: {e}"),
        status: None,
    })?;

    claims
        .username
        .filter(|u| !u.is_empty())
        .or_else(|| claims.acct.and_then(|a| a.game_name).filter(|n| !n.is_empty()))
        .ok_or_else(|| CoreError::Api {
            message: "userinfo carries no username".into(),
            status: None,
        })
}

// ── Account directory ────────────────────────────────────────────────

/// [`AccountDirectory`] backed by the account backend.
pub struct BackendDirectory {
    client: BackendClient,
}

impl BackendDirectory {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AccountDirectory for BackendDirectory {
    async fn list_managed(&self) -> Result<Vec<String>, CoreError> {
        let accounts = self.client.list_managed().await?;
        Ok(accounts.into_iter().map(|a| a.username).collect())
    }

    async fn save(&self, record: &AccountRecord) -> Result<(), CoreError> {
        self.client.save(&record.username, record).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use riftlink_api::{ProcessInfo, StaticProcessTable};

    use super::*;

    fn jwt(claims: &Value) -> String {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).expect("claims"));
        format!("eyJhbGciOiJSUzI1NiJ9.{payload}.c2ln")
    }

    fn process(name: &str) -> ProcessInfo {
        ProcessInfo {
            pid: 1,
            name: name.into(),
            cmd: vec![],
        }
    }

    #[test]
    fn username_claim_is_preferred() {
        let token = jwt(&json!({"username": "testuser", "acct": {"game_name": "Tester"}}));
        assert_eq!(username_from_token(&token).expect("username"), "testuser");
    }

    #[test]
    fn falls_back_to_game_name() {
        let token = jwt(&json!({"username": "", "acct": {"game_name": "Tester"}}));
        assert_eq!(username_from_token(&token).expect("username"), "Tester");
    }

    #[test]
    fn malformed_tokens_are_api_errors() {
        assert!(matches!(
            username_from_token("not-a-jwt"),
            Err(CoreError::Api { .. })
        ));
        assert!(matches!(
            username_from_token("a.!!!.c"),
            Err(CoreError::Api { .. })
        ));
        assert!(matches!(
            username_from_token(&jwt(&json!({"sub": "x"}))),
            Err(CoreError::Api { .. })
        ));
    }

    #[test]
    fn lifecycle_maps_process_names() {
        let table = Arc::new(StaticProcessTable(vec![
            process("LeagueClientUx.exe"),
            process("League of Legends"),
        ]));
        let lifecycle = LocalProcessLifecycle::new(table);

        assert!(!lifecycle.is_client_running());
        assert!(lifecycle.is_game_client_running());
        assert!(lifecycle.is_playing());
    }
}
