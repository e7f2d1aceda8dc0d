//! Remote account backend client.
//!
//! Thin JSON client for the account-storage service: fetch the managed pool,
//! upsert one account snapshot. Authenticates with a bearer API key.

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// One entry of the managed account pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedAccount {
    pub username: String,
    /// Fields the backend returns that this client does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// HTTP client for the account backend.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
}

impl BackendClient {
    pub fn new(
        base_url: Url,
        api_key: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self::with_client(
            transport.build_backend_client()?,
            base_url,
            api_key,
        ))
    }

    /// Build from a pre-configured `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, api_key: SecretString) -> Self {
        Self {
            http,
            base_url,
            api_key,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET {base}/api/v1/accounts/managed`
    pub async fn list_managed(&self) -> Result<Vec<ManagedAccount>, Error> {
        let url = self.endpoint(&["api", "v1", "accounts", "managed"])?;
        debug!("GET {}", url);
        let resp = self
            .http
            .get(url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `PUT {base}/api/v1/accounts/{username}` with `record` as the body.
    pub async fn save(&self, username: &str, record: &(impl Serialize + Sync)) -> Result<(), Error> {
        let url = self.endpoint(&["api", "v1", "accounts", username])?;
        debug!("PUT {}", url);
        let resp = self
            .http
            .put(url)
            .bearer_auth(self.api_key.expose_secret())
            .json(record)
            .send()
            .await?;
        parse_response::<serde_json::Value>(resp).await.map(|_| ())
    }

    /// Append percent-encoded segments to the base URL's path.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Backend {
                status: 0,
                message: format!("base URL cannot hold a path: {}", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let status = resp.status();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Authentication {
            message: "backend rejected the API key".into(),
        });
    }

    let body = resp.text().await?;
    if !status.is_success() {
        return Err(Error::Backend {
            status: status.as_u16(),
            message: body.chars().take(200).collect(),
        });
    }

    let text = if body.trim().is_empty() { "null" } else { body.as_str() };
    serde_json::from_str(text).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: body.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> BackendClient {
        BackendClient::with_client(
            reqwest::Client::new(),
            Url::parse(base).expect("url"),
            SecretString::from("k".to_owned()),
        )
    }

    #[test]
    fn endpoint_encodes_username() {
        let url = client("https://backend.example")
            .endpoint(&["api", "v1", "accounts", "a b/c"])
            .expect("endpoint");
        assert_eq!(url.as_str(), "https://backend.example/api/v1/accounts/a%20b%2Fc");
    }

    #[test]
    fn endpoint_keeps_base_prefix() {
        let url = client("https://backend.example/prefix/")
            .endpoint(&["api", "v1", "accounts", "managed"])
            .expect("endpoint");
        assert_eq!(url.path(), "/prefix/api/v1/accounts/managed");
    }

    #[test]
    fn managed_account_keeps_unknown_fields() {
        let account: ManagedAccount =
            serde_json::from_str(r#"{"username":"testuser","tier":"GOLD"}"#).expect("json");
        assert_eq!(account.username, "testuser");
        assert_eq!(account.extra["tier"], "GOLD");
    }
}
