// ── Runtime monitor configuration ──
//
// Timing knobs for the monitor, the websocket manager and the identity
// cache. Built by the binary from the loaded config file; core never reads
// config files itself.

use std::time::Duration;

/// Tuning for one monitoring session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Client state polling interval.
    pub poll_interval: Duration,
    /// How often the websocket manager re-checks its connection.
    pub websocket_reconnect: Duration,
    /// Hard deadline for a captcha challenge.
    pub captcha_timeout: Duration,
    /// Readiness probe timeout against the local API.
    pub probe_timeout: Duration,
    /// How long the managed account list is trusted.
    pub account_cache_ttl: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(750),
            websocket_reconnect: Duration::from_secs(5),
            captcha_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(1),
            account_cache_ttl: Duration::from_secs(300),
        }
    }
}

impl MonitorConfig {
    /// Transport settings for local API connections.
    pub fn transport(&self) -> riftlink_api::TransportConfig {
        riftlink_api::TransportConfig {
            probe_timeout: self.probe_timeout,
            ..riftlink_api::TransportConfig::default()
        }
    }

    pub fn websocket(&self) -> riftlink_api::WebSocketConfig {
        riftlink_api::WebSocketConfig {
            reconnect_interval: self.websocket_reconnect,
            ..riftlink_api::WebSocketConfig::default()
        }
    }
}
