//! Shared wiring for command handlers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use riftlink_api::{
    BackendClient, CredentialDiscovery, LocalApiConnection, ProcessTable, ProcessTarget,
    SysinfoProcessTable,
};
use riftlink_config::{Config, resolve_backend_api_key};
use riftlink_core::{
    AccountDirectory, AccountRecord, AccountSnapshotStore, BackendDirectory, BroadcastEmitter,
    CaptchaChallenge, CaptchaResponder, CaptchaSurface, ClientStateMonitor, CloseHook, CoreError,
    LocalApiAuthenticator, LocalIdentityResolver, LocalProcessLifecycle, MonitorConfig,
    MonitorPorts,
};

use crate::error::CliError;

// ── Collaborators without a backing service ─────────────────────────

/// Directory used when no backend is configured: nothing is managed and
/// saves are dropped.
pub struct OfflineDirectory;

#[async_trait]
impl AccountDirectory for OfflineDirectory {
    async fn list_managed(&self) -> Result<Vec<String>, CoreError> {
        Ok(Vec::new())
    }

    async fn save(&self, record: &AccountRecord) -> Result<(), CoreError> {
        debug!(username = %record.username, "no backend configured; snapshot not saved");
        Ok(())
    }
}

/// Captcha surface for terminal sessions, which cannot render a widget.
pub struct HeadlessCaptcha;

#[async_trait]
impl CaptchaSurface for HeadlessCaptcha {
    async fn acquire(
        &self,
        _challenge: &CaptchaChallenge,
        _responder: CaptchaResponder,
    ) -> Result<(), CoreError> {
        Err(CoreError::Captcha {
            message: "no captcha surface in a terminal session".into(),
        })
    }

    fn register_close_hook(&self, _hook: CloseHook) -> u64 {
        0
    }

    fn unregister_close_hook(&self, _id: u64) {}

    async fn show(&self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn hide(&self) {}
}

// ── Wiring ──────────────────────────────────────────────────────────

/// Everything a monitoring session needs, wired against the real system.
pub struct Session {
    pub monitor: ClientStateMonitor,
    pub emitter: BroadcastEmitter,
    pub accounts: Arc<AccountSnapshotStore>,
    /// Connection to the game client, for the event bus.
    pub league: Arc<LocalApiConnection>,
    pub monitor_config: MonitorConfig,
}

fn directory(
    cfg: &Config,
    monitor_config: &MonitorConfig,
) -> Result<Arc<dyn AccountDirectory>, CliError> {
    let Some(url) = cfg.backend.parsed_url()? else {
        info!("no backend configured; running without managed accounts");
        return Ok(Arc::new(OfflineDirectory));
    };
    let api_key = resolve_backend_api_key(&cfg.backend)?;
    let client = BackendClient::new(url, api_key, &monitor_config.transport())?;
    Ok(Arc::new(BackendDirectory::new(client)))
}

/// Build the monitor and its collaborators from the loaded config.
///
/// Without `with_backend` the session never talks to the account backend.
pub fn build_session(cfg: &Config, with_backend: bool) -> Result<Session, CliError> {
    let monitor_config = cfg.to_monitor_config()?;
    let transport = monitor_config.transport();
    let table: Arc<dyn ProcessTable> = Arc::new(SysinfoProcessTable::default());

    let riot = Arc::new(LocalApiConnection::new(
        CredentialDiscovery::with_table(ProcessTarget::riot_client(), Arc::clone(&table)),
        transport.clone(),
    ));
    let league = Arc::new(LocalApiConnection::new(
        CredentialDiscovery::with_table(ProcessTarget::league_client(), Arc::clone(&table)),
        transport,
    ));

    let directory: Arc<dyn AccountDirectory> = if with_backend {
        directory(cfg, &monitor_config)?
    } else {
        Arc::new(OfflineDirectory)
    };
    let accounts = Arc::new(AccountSnapshotStore::new(
        Arc::clone(&league),
        Arc::clone(&directory),
    ));
    let emitter = BroadcastEmitter::new();

    let monitor = ClientStateMonitor::new(
        monitor_config.clone(),
        MonitorPorts {
            lifecycle: Arc::new(LocalProcessLifecycle::new(table)),
            authenticator: Arc::new(LocalApiAuthenticator::new(Arc::clone(&riot))),
            identity: Arc::new(LocalIdentityResolver::new(riot)),
            accounts: accounts.clone(),
            directory,
            emitter: Arc::new(emitter.clone()),
            captcha_surface: Arc::new(HeadlessCaptcha),
        },
    );

    Ok(Session {
        monitor,
        emitter,
        accounts,
        league,
        monitor_config,
    })
}
