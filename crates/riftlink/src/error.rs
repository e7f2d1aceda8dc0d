//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use riftlink_config::ConfigError;
use riftlink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_RUNNING: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Client ───────────────────────────────────────────────────────
    #[error("Client is not running: {reason}")]
    #[diagnostic(
        code(riftlink::not_running),
        help("Start the launcher first, then retry.")
    )]
    ClientNotRunning { reason: String },

    #[error("Could not reach the local API: {reason}")]
    #[diagnostic(
        code(riftlink::connection_failed),
        help("The client may still be starting up. Try: riftlink status -v")
    )]
    ConnectionFailed { reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(code(riftlink::auth_failed))]
    AuthFailed { message: String },

    #[error("No backend API key configured")]
    #[diagnostic(
        code(riftlink::no_credentials),
        help(
            "Set backend.api_key_env in the config file, store the key in the system\n\
             keyring (service 'riftlink', user 'backend-api-key'), or set backend.api_key."
        )
    )]
    NoCredentials,

    // ── Flows ────────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(riftlink::conflict))]
    Conflict { message: String },

    #[error("Timed out waiting for {what} after {seconds}s")]
    #[diagnostic(code(riftlink::timeout))]
    Timeout { what: String, seconds: u64 },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error: {message}")]
    #[diagnostic(code(riftlink::api_error))]
    ApiError {
        message: String,
        status: Option<u16>,
    },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(riftlink::validation))]
    Validation { field: String, reason: String },

    #[error("Configuration file already exists")]
    #[diagnostic(
        code(riftlink::config_exists),
        help("Use --force to overwrite it.\nPath: {path}")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(riftlink::config))]
    Config(Box<figment::Error>),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to write TOML: {0}")]
    Toml(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ClientNotRunning { .. } => exit_code::NOT_RUNNING,
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials => exit_code::AUTH,
            Self::Conflict { .. } | Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Config(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ClientNotRunning { reason } => CliError::ClientNotRunning { reason },
            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed { reason },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            err @ (CoreError::FlowInProgress { .. }
            | CoreError::InvalidState { .. }
            | CoreError::Cancelled { .. }
            | CoreError::Captcha { .. }) => CliError::Conflict {
                message: err.to_string(),
            },
            CoreError::Timeout { what, timeout_secs } => CliError::Timeout {
                what,
                seconds: timeout_secs,
            },
            CoreError::Api { message, status } | CoreError::Backend { message, status } => {
                CliError::ApiError { message, status }
            }
            CoreError::Internal(message) => CliError::ApiError {
                message,
                status: None,
            },
        }
    }
}

impl From<riftlink_api::Error> for CliError {
    fn from(err: riftlink_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials => CliError::NoCredentials,
            ConfigError::Serialization(e) => CliError::Toml(e.to_string()),
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}
