//! Local API HTTP client.
//!
//! Wraps `reqwest::Client` with credential discovery, lazy initialization and
//! stale-connection detection. The client's token rotates on every restart,
//! so any transport or auth failure drops the stored client; the next caller
//! re-runs discovery through `ensure_initialized()`.

use std::sync::RwLock;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::discovery::{CredentialDiscovery, Credentials};
use crate::error::Error;
use crate::transport::TransportConfig;

/// Cheap endpoint used as the readiness probe.
pub const DEFAULT_PROBE_PATH: &str = "/riotclient/app-name";

/// Poll cadence of [`LocalApiConnection::wait_until_ready`].
const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
struct LocalClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
}

/// HTTPS connection to a locally running client's API.
///
/// Owns its discovery and the currently built client. Cheap to share
/// behind an `Arc`; all methods take `&self`.
pub struct LocalApiConnection {
    discovery: CredentialDiscovery,
    transport: TransportConfig,
    probe_path: String,
    /// Replaces `https://127.0.0.1:<port>` (tests, port forwards).
    base_override: Option<Url>,
    client: RwLock<Option<LocalClient>>,
}

impl LocalApiConnection {
    pub fn new(discovery: CredentialDiscovery, transport: TransportConfig) -> Self {
        Self {
            discovery,
            transport,
            probe_path: DEFAULT_PROBE_PATH.to_owned(),
            base_override: None,
            client: RwLock::new(None),
        }
    }

    /// Send every request to `base_url` instead of the discovered port.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_override = Some(base_url);
        self
    }

    pub fn with_probe_path(mut self, path: impl Into<String>) -> Self {
        self.probe_path = path.into();
        self
    }

    pub fn discovery(&self) -> &CredentialDiscovery {
        &self.discovery
    }

    /// Whether the target process is present (no network I/O).
    pub fn is_process_running(&self) -> bool {
        self.discovery.is_running()
    }

    /// Re-discover credentials. Never cached: the token rotates.
    pub fn credentials(&self) -> Result<Credentials, Error> {
        self.discovery.discover()
    }

    /// Discover credentials and build a fresh HTTPS client.
    pub fn initialize(&self) -> Result<(), Error> {
        let credentials = self.discovery.discover()?;
        let http = self.transport.build_local_client(&credentials.auth_token)?;
        let base_url = match &self.base_override {
            Some(url) => url.clone(),
            None => Url::parse(&format!("https://127.0.0.1:{}", credentials.port))?,
        };
        debug!(base = %base_url, pid = credentials.process_id, "local API client initialized");
        *self.client.write().expect("local client lock poisoned") = Some(LocalClient {
            http,
            base_url,
            credentials,
        });
        Ok(())
    }

    /// Drop the current client; the next `ensure_initialized()` rebuilds it.
    pub fn reset(&self) {
        if self
            .client
            .write()
            .expect("local client lock poisoned")
            .take()
            .is_some()
        {
            debug!("local API client reset");
        }
    }

    fn current(&self) -> Option<LocalClient> {
        self.client
            .read()
            .expect("local client lock poisoned")
            .clone()
    }

    /// True only if a client exists and the probe returns 2xx within the
    /// probe timeout. Transport and TLS failures read as `false`.
    pub async fn is_initialized(&self) -> bool {
        let Some(client) = self.current() else {
            return false;
        };
        let Ok(url) = client.base_url.join(&self.probe_path) else {
            return false;
        };
        match client
            .http
            .get(url)
            .timeout(self.transport.probe_timeout)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                trace!(error = %e, "readiness probe failed");
                false
            }
        }
    }

    /// Initialize if the probe fails, then probe again.
    pub async fn ensure_initialized(&self) -> Result<(), Error> {
        if self.is_initialized().await {
            return Ok(());
        }
        self.initialize()?;
        if self.is_initialized().await {
            Ok(())
        } else {
            self.reset();
            Err(Error::NotInitialized)
        }
    }

    /// Poll once a second until the API answers, or fail with
    /// [`Error::Timeout`] once `timeout` elapses.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), Error> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.ensure_initialized().await.is_ok() {
                return Ok(());
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(Error::Timeout {
                    what: "local API readiness",
                    timeout_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(READY_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Base URL of the current client, if initialized.
    pub fn base_url(&self) -> Option<Url> {
        self.current().map(|c| c.base_url)
    }

    /// Credentials the current client was built with, if initialized.
    pub fn active_credentials(&self) -> Option<Credentials> {
        self.current().map(|c| c.credentials)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// GET `path` and deserialize the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let (client, url) = self.request_target(path)?;
        debug!("GET {}", url);
        let resp = client.http.get(url).send().await;
        self.finish(resp).await
    }

    /// PUT a JSON body and deserialize the response (`null` when empty).
    pub async fn put_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        let (client, url) = self.request_target(path)?;
        debug!("PUT {}", url);
        let resp = client.http.put(url).json(body).send().await;
        self.finish(resp).await
    }

    /// POST a JSON body and deserialize the response (`null` when empty).
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        let (client, url) = self.request_target(path)?;
        debug!("POST {}", url);
        let resp = client.http.post(url).json(body).send().await;
        self.finish(resp).await
    }

    /// DELETE `path`, discarding any body.
    pub async fn delete(&self, path: &str) -> Result<(), Error> {
        let (client, url) = self.request_target(path)?;
        debug!("DELETE {}", url);
        let resp = client.http.delete(url).send().await;
        self.finish::<serde_json::Value>(resp).await.map(|_| ())
    }

    fn request_target(&self, path: &str) -> Result<(LocalClient, Url), Error> {
        let client = self.current().ok_or(Error::NotInitialized)?;
        let url = client.base_url.join(path)?;
        Ok((client, url))
    }

    async fn finish<T: DeserializeOwned>(
        &self,
        resp: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<T, Error> {
        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                // Connection-level failure: the client probably restarted.
                self.reset();
                return Err(Error::Transport(e));
            }
        };

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.reset();
            return Err(Error::Authentication {
                message: "local API rejected the auth token".into(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        if !status.is_success() {
            return Err(Error::LocalApi {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let text = if body.trim().is_empty() { "null" } else { body.as_str() };
        serde_json::from_str(text).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })
    }
}
