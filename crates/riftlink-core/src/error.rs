// ── Core error types ──
//
// Domain errors surfaced by riftlink-core. Consumers never match on HTTP
// status codes or raw frames; `From<riftlink_api::Error>` folds transport
// failures into these variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Client is not running: {reason}")]
    ClientNotRunning { reason: String },

    #[error("Cannot reach the local API: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Flow errors ──────────────────────────────────────────────────
    #[error("A {flow} flow is already in progress")]
    FlowInProgress { flow: &'static str },

    #[error("Timed out after {timeout_secs}s waiting for {what}")]
    Timeout { what: String, timeout_secs: u64 },

    #[error("Invalid state for {operation}: client is {state}")]
    InvalidState { operation: String, state: String },

    #[error("Cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("Captcha failed: {message}")]
    Captcha { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("Local API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Account backend error: {message}")]
    Backend {
        message: String,
        status: Option<u16>,
    },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the next scheduled tick is expected to clear this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ClientNotRunning { .. } | Self::ConnectionFailed { .. } | Self::Timeout { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<riftlink_api::Error> for CoreError {
    fn from(err: riftlink_api::Error) -> Self {
        use riftlink_api::Error as Api;

        match err {
            Api::ClientNotFound { reason } => CoreError::ClientNotRunning { reason },
            Api::NotInitialized => CoreError::ConnectionFailed {
                reason: "local API is not initialized".into(),
            },
            Api::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout {
                        what: "local API request".into(),
                        timeout_secs: 0,
                    }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            Api::InvalidUrl(e) => CoreError::Internal(format!("Invalid URL: {e}")),
            Api::Timeout { what, timeout_secs } => CoreError::Timeout {
                what: what.to_owned(),
                timeout_secs,
            },
            Api::Tls(msg) => CoreError::ConnectionFailed {
                reason: format!("TLS error: {msg}"),
            },
            Api::Authentication { message } => CoreError::AuthenticationFailed { message },
            Api::LocalApi { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            Api::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                reason: format!("WebSocket connection failed: {reason}"),
            },
            Api::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            Api::NotConnected => CoreError::ConnectionFailed {
                reason: "WebSocket is not connected".into(),
            },
            Api::Protocol(message) => CoreError::Api {
                message: format!("protocol error: {message}"),
                status: None,
            },
            Api::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            Api::Backend { status, message } => CoreError::Backend {
                message,
                status: Some(status),
            },
        }
    }
}
