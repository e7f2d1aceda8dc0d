//! Async client for a local game client's control API (HTTPS + WebSocket)

pub mod backend;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod local;
pub mod router;
pub mod transport;
pub mod websocket;

pub use backend::{BackendClient, ManagedAccount};
pub use discovery::{
    CredentialDiscovery, Credentials, ProcessInfo, ProcessTable, ProcessTarget,
    StaticProcessTable, SysinfoProcessTable,
};
pub use error::Error;
pub use frame::{ApiEvent, EventType};
pub use local::LocalApiConnection;
pub use router::{EventHandler, EventRouter};
pub use transport::TransportConfig;
pub use websocket::{FrameSink, SubscriptionManager, WebSocketConfig};
