// ── Managed account identity cache ──
//
// TTL cache over the backend's managed account list. Lookups are
// case-insensitive. A miss may force one refresh (older than half the TTL,
// or a username not yet confirmed missing in this generation); no lookup
// ever triggers more than one refresh.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::ports::AccountDirectory;

#[derive(Default)]
struct CacheInner {
    /// Lowercased usernames.
    entries: HashSet<String>,
    fetched_at: Option<Instant>,
    /// Lowercased usernames a refresh of this generation did not contain.
    confirmed_missing: HashSet<String>,
}

impl CacheInner {
    fn age(&self, now: Instant) -> Option<Duration> {
        self.fetched_at.map(|at| now.saturating_duration_since(at))
    }

    fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        self.entries.is_empty() || self.age(now).is_none_or(|age| age >= ttl)
    }
}

/// Answers "is this username one of ours?".
pub struct AccountIdentityCache {
    directory: Arc<dyn AccountDirectory>,
    ttl: Duration,
    inner: Mutex<CacheInner>,
}

impl AccountIdentityCache {
    pub fn new(directory: Arc<dyn AccountDirectory>, ttl: Duration) -> Self {
        Self {
            directory,
            ttl,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn is_managed(&self, username: &str) -> bool {
        let needle = username.to_lowercase();
        let mut inner = self.inner.lock().await;

        let mut refreshed = false;
        if inner.is_stale(Instant::now(), self.ttl) {
            self.refresh_locked(&mut inner).await;
            refreshed = true;
        }
        if inner.entries.contains(&needle) {
            return true;
        }

        if !refreshed {
            let half_expired = inner
                .age(Instant::now())
                .is_none_or(|age| age >= self.ttl / 2);
            if half_expired || !inner.confirmed_missing.contains(&needle) {
                debug!(username, half_expired, "managed lookup miss; forcing refresh");
                self.refresh_locked(&mut inner).await;
                if inner.entries.contains(&needle) {
                    return true;
                }
            }
        }

        inner.confirmed_missing.insert(needle);
        false
    }

    /// Refetch the managed list now. Returns the number of entries.
    pub async fn refresh(&self) -> Result<usize, CoreError> {
        let mut inner = self.inner.lock().await;
        self.try_refresh_locked(&mut inner).await
    }

    /// Forget everything; the next lookup refetches.
    pub async fn invalidate(&self) {
        *self.inner.lock().await = CacheInner::default();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Refresh, keeping the previous entries if the fetch fails.
    async fn refresh_locked(&self, inner: &mut CacheInner) {
        if let Err(e) = self.try_refresh_locked(inner).await {
            warn!(error = %e, kept = inner.entries.len(), "managed account refresh failed");
        }
    }

    async fn try_refresh_locked(&self, inner: &mut CacheInner) -> Result<usize, CoreError> {
        let usernames = self.directory.list_managed().await?;
        inner.entries = usernames.iter().map(|u| u.to_lowercase()).collect();
        inner.fetched_at = Some(Instant::now());
        inner.confirmed_missing.clear();
        debug!(count = inner.entries.len(), "managed accounts refreshed");
        Ok(inner.entries.len())
    }
}
