// ── Account snapshot store ──
//
// Owns the canonical `AccountRecord` of the tracked session. Websocket
// handlers feed it sparse patches; `refresh()` rebuilds it from the game
// client's local API and pushes the result to the account directory.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use riftlink_api::LocalApiConnection;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{AccountRecord, PartialAccount, RankedPayload, SummonerPayload, WalletPayload};
use crate::ports::{AccountDirectory, AccountState};

pub const SUMMONER_PATH: &str = "/lol-summoner/v1/current-summoner";
pub const WALLET_PATH: &str = "/lol-inventory/v1/wallet";
pub const RANKED_PATH: &str = "/lol-ranked/v1/current-ranked-stats";
pub const REGION_PATH: &str = "/riotclient/region-locale";
pub const CHAMPIONS_PATH: &str = "/lol-inventory/v2/inventory/CHAMPION";
pub const SKINS_PATH: &str = "/lol-inventory/v2/inventory/CHAMPION_SKIN";

#[derive(Debug, Default, Deserialize)]
struct RegionLocale {
    #[serde(default)]
    region: Option<String>,
}

/// [`AccountState`] backed by the game client's local API.
pub struct AccountSnapshotStore {
    connection: Arc<LocalApiConnection>,
    directory: Arc<dyn AccountDirectory>,
    record: Mutex<Option<AccountRecord>>,
}

impl AccountSnapshotStore {
    pub fn new(connection: Arc<LocalApiConnection>, directory: Arc<dyn AccountDirectory>) -> Self {
        Self {
            connection,
            directory,
            record: Mutex::new(None),
        }
    }

    async fn tracked_username(&self) -> Result<String, CoreError> {
        self.record
            .lock()
            .await
            .as_ref()
            .map(|r| r.username.clone())
            .ok_or_else(|| CoreError::InvalidState {
                operation: "account refresh".into(),
                state: "no tracked account".into(),
            })
    }

    /// Fetch every section. Only the summoner is required.
    async fn fetch_snapshot(&self) -> Result<PartialAccount, CoreError> {
        self.connection.ensure_initialized().await?;

        let summoner: SummonerPayload = self.connection.get_json(SUMMONER_PATH).await?;
        let mut patch = PartialAccount::from(summoner);

        if let Some(wallet) = self.optional::<WalletPayload>(WALLET_PATH).await {
            patch = patch.and(wallet.into());
        }
        if let Some(ranked) = self.optional::<RankedPayload>(RANKED_PATH).await {
            patch = patch.and(ranked.into());
        }
        if let Some(locale) = self.optional::<RegionLocale>(REGION_PATH).await {
            patch.region = locale.region.filter(|r| !r.is_empty());
        }
        patch.champion_count = self.count(CHAMPIONS_PATH).await;
        patch.skin_count = self.count(SKINS_PATH).await;
        Ok(patch)
    }

    async fn optional<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        match self.connection.get_json(path).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path, error = %e, "skipping account section");
                None
            }
        }
    }

    async fn count(&self, path: &str) -> Option<u32> {
        let items: Vec<Value> = self.optional(path).await?;
        u32::try_from(items.len()).ok()
    }

    async fn persist(&self, record: &AccountRecord) -> Result<(), CoreError> {
        self.directory.save(record).await?;
        debug!(username = %record.username, "account record saved");
        Ok(())
    }
}

#[async_trait]
impl AccountState for AccountSnapshotStore {
    async fn get(&self) -> Option<AccountRecord> {
        self.record.lock().await.clone()
    }

    async fn set_username(&self, username: &str) {
        let mut record = self.record.lock().await;
        if record.as_ref().is_some_and(|r| r.username == username) {
            return;
        }
        debug!(username, "tracking new account");
        *record = Some(AccountRecord::new(username));
    }

    async fn update(&self, patch: PartialAccount) -> Result<AccountRecord, CoreError> {
        let snapshot = {
            let mut guard = self.record.lock().await;
            let record = guard.as_mut().ok_or_else(|| CoreError::InvalidState {
                operation: "account update".into(),
                state: "no tracked account".into(),
            })?;
            if !record.merge(patch) {
                return Ok(record.clone());
            }
            record.updated_at = Some(Utc::now());
            record.clone()
        };
        self.persist(&snapshot).await?;
        Ok(snapshot)
    }

    async fn refresh(&self) -> Result<AccountRecord, CoreError> {
        let username = self.tracked_username().await?;
        let patch = self.fetch_snapshot().await?;

        let snapshot = {
            let mut guard = self.record.lock().await;
            let record = match guard.as_mut() {
                Some(r) if r.username == username => r,
                _ => {
                    return Err(CoreError::Cancelled {
                        reason: format!("account changed while refreshing {username}"),
                    });
                }
            };
            record.merge(patch);
            record.updated_at = Some(Utc::now());
            record.clone()
        };

        self.persist(&snapshot).await?;
        info!(
            username = %snapshot.username,
            level = ?snapshot.summoner_level,
            "account refreshed"
        );
        Ok(snapshot)
    }
}
