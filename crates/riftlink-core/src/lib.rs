//! Client monitoring logic between `riftlink-api` and its consumers.
//!
//! This crate owns the state machine, account tracking and login flows of
//! the riftlink workspace:
//!
//! - **[`ClientStateMonitor`]**: polls process presence and auth state on a
//!   fixed interval, derives the authoritative [`ClientState`] through the
//!   pure transition table [`ClientState::next`], and emits
//!   [`MonitorEvent`]s on every change.
//!
//! - **[`AccountIdentityCache`]**: TTL cache answering whether a username
//!   belongs to the managed pool, with a bounded miss-refresh policy.
//!
//! - **[`CaptchaFlowCoordinator`]**: single-flight captcha sub-flow raced
//!   against a deadline and a window-close hook.
//!
//! - **[`AccountSnapshotStore`]** and **[`WebsocketHandlerBridge`]**: keep
//!   the canonical [`AccountRecord`] current from full refreshes and live
//!   event-bus patches.
//!
//! - **Ports** ([`ports`]): one capability trait per collaborator, with
//!   concrete implementations in [`adapters`].

pub mod account_store;
pub mod accounts;
pub mod adapters;
pub mod captcha;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod model;
pub mod monitor;
pub mod ports;
pub mod state;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use account_store::AccountSnapshotStore;
pub use accounts::AccountIdentityCache;
pub use adapters::{
    BackendDirectory, LocalApiAuthenticator, LocalIdentityResolver, LocalProcessLifecycle,
};
pub use captcha::{CaptchaFlowCoordinator, StateGate};
pub use config::MonitorConfig;
pub use error::CoreError;
pub use events::{BroadcastEmitter, MonitorEvent};
pub use handlers::WebsocketHandlerBridge;
pub use model::{AccountRecord, PartialAccount, RankedEntry};
pub use monitor::{ClientStateMonitor, MonitorPorts};
pub use ports::{
    AccountDirectory, AccountState, Authenticator, CaptchaChallenge, CaptchaResponder,
    CaptchaSurface, CloseHook, EventEmitter, IdentityResolver, LoginRequest, ProcessLifecycle,
};
pub use state::{AuthSignal, ClientState, Sample};
