use thiserror::Error;

/// Top-level error type for the `riftlink-api` crate.
///
/// Covers every failure mode of the transport layer: process discovery,
/// HTTPS requests against the local API, the WebSocket event bus, and the
/// remote account backend. `riftlink-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Discovery ───────────────────────────────────────────────────
    /// The client process is not running, or its command line lacks one of
    /// the port / auth-token / pid flags.
    #[error("Client process not found: {reason}")]
    ClientNotFound { reason: String },

    /// A request was attempted before `initialize()` succeeded.
    #[error("Local API connection is not initialized")]
    NotInitialized,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, reset, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A bounded wait exceeded its deadline.
    #[error("Timed out after {timeout_secs}s waiting for {what}")]
    Timeout { what: &'static str, timeout_secs: u64 },

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Local API ───────────────────────────────────────────────────
    /// The local API rejected the basic-auth token (usually rotated).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Non-success HTTP status from the local API.
    #[error("Local API error (HTTP {status}): {message}")]
    LocalApi { status: u16, message: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed by the peer.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// A write was attempted with no live socket.
    #[error("WebSocket is not connected")]
    NotConnected,

    /// A frame did not match the expected `[code, topic, payload]` shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Backend ─────────────────────────────────────────────────────
    /// Error response from the remote account backend.
    #[error("Backend error (HTTP {status}): {message}")]
    Backend { status: u16, message: String },
}

impl Error {
    /// Returns `true` if this error means the client is simply not running.
    pub fn is_not_running(&self) -> bool {
        matches!(self, Self::ClientNotFound { .. })
    }

    /// Returns `true` if this is a transient error worth retrying on the
    /// next scheduled attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. }
            | Self::WebSocketConnect(_)
            | Self::WebSocketClosed { .. }
            | Self::NotConnected
            | Self::NotInitialized => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::LocalApi { status: 404, .. } | Self::Backend { status: 404, .. } => true,
            _ => false,
        }
    }
}
