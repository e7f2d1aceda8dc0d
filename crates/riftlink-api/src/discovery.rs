//! Credential discovery.
//!
//! The client exposes its API on a random loopback port guarded by a token
//! that rotates on every restart. Both are only visible on the client's own
//! command line, so discovery scans the OS process table and pulls the
//! port / token / pid flags out of the matching process's arguments.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::{Duration, Instant};

use regex::Regex;
use secrecy::SecretString;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{debug, trace};

use crate::error::Error;

/// Matches `--flag=value` and `--flag="value with spaces"`.
static FLAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"--([A-Za-z0-9][A-Za-z0-9_-]*)=(?:"([^"]*)"|([^\s"]+))"#)
        .expect("flag pattern is a valid regex")
});

// ── Credentials ──────────────────────────────────────────────────────

/// Everything needed to talk to the local API of one running client.
///
/// Extracted fresh for every connection attempt and never persisted.
/// `Debug` output redacts the token.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub port: u16,
    pub auth_token: SecretString,
    pub process_id: u32,
}

// ── ProcessTarget ────────────────────────────────────────────────────

/// Which process to look for and which flags carry its credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTarget {
    /// Accepted process names, compared case-insensitively without `.exe`.
    pub process_names: Vec<String>,
    pub port_flag: String,
    pub token_flag: String,
    pub pid_flag: String,
}

impl ProcessTarget {
    /// The lightweight launcher/auth client.
    pub fn riot_client() -> Self {
        Self {
            process_names: vec!["RiotClientUx".into(), "Riot Client".into()],
            port_flag: "app-port".into(),
            token_flag: "remoting-auth-token".into(),
            pid_flag: "app-pid".into(),
        }
    }

    /// The heavier game client UX process.
    pub fn league_client() -> Self {
        Self {
            process_names: vec!["LeagueClientUx".into()],
            port_flag: "app-port".into(),
            token_flag: "remoting-auth-token".into(),
            pid_flag: "app-pid".into(),
        }
    }
}

// ── Process table ────────────────────────────────────────────────────

/// One row of the OS process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cmd: Vec<String>,
}

/// Source of process listings. Real systems use [`SysinfoProcessTable`];
/// tests supply a fixed table.
pub trait ProcessTable: Send + Sync {
    /// All processes whose name matches one of `names`.
    fn find(&self, names: &[String]) -> Vec<ProcessInfo>;

    /// Whether any process matching `names` is running.
    fn is_running(&self, names: &[String]) -> bool {
        !self.find(names).is_empty()
    }
}

/// How long one `sysinfo` scan answers lookups. Shorter than a poll tick,
/// so each tick sees fresh data but scans once.
pub const DEFAULT_SNAPSHOT_AGE: Duration = Duration::from_millis(250);

/// Process table backed by `sysinfo`.
///
/// Lookups within `max_age` of each other share one scan of the OS table.
#[derive(Debug)]
pub struct SysinfoProcessTable {
    max_age: Duration,
    snapshot: Mutex<Option<(Instant, Arc<Vec<ProcessInfo>>)>>,
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::with_max_age(DEFAULT_SNAPSHOT_AGE)
    }
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            max_age,
            snapshot: Mutex::new(None),
        }
    }

    /// Every process, from the cached scan if it is fresh enough.
    pub fn snapshot(&self) -> Arc<Vec<ProcessInfo>> {
        let mut cached = self.snapshot.lock().expect("process snapshot lock poisoned");
        if let Some((taken, processes)) = cached.as_ref() {
            if taken.elapsed() < self.max_age {
                return Arc::clone(processes);
            }
        }
        let processes = Arc::new(scan_processes());
        trace!(count = processes.len(), "process table scanned");
        *cached = Some((Instant::now(), Arc::clone(&processes)));
        processes
    }
}

fn scan_processes() -> Vec<ProcessInfo> {
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
    );

    sys.processes()
        .values()
        .map(|p| ProcessInfo {
            pid: p.pid().as_u32(),
            name: p.name().to_string_lossy().into_owned(),
            cmd: p
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
        })
        .collect()
}

impl ProcessTable for SysinfoProcessTable {
    fn find(&self, names: &[String]) -> Vec<ProcessInfo> {
        self.snapshot()
            .iter()
            .filter(|p| name_matches(&p.name, names))
            .cloned()
            .collect()
    }
}

/// A fixed process listing, for tests and for pinning credentials by hand.
#[derive(Debug, Default, Clone)]
pub struct StaticProcessTable(pub Vec<ProcessInfo>);

impl ProcessTable for StaticProcessTable {
    fn find(&self, names: &[String]) -> Vec<ProcessInfo> {
        self.0
            .iter()
            .filter(|p| name_matches(&p.name, names))
            .cloned()
            .collect()
    }
}

fn normalize_name(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    lower
        .strip_suffix(".exe")
        .map_or_else(|| lower.clone(), str::to_owned)
}

fn name_matches(candidate: &str, names: &[String]) -> bool {
    let candidate = normalize_name(candidate);
    names.iter().any(|n| normalize_name(n) == candidate)
}

// ── CredentialDiscovery ──────────────────────────────────────────────

/// Finds the target process and extracts its API credentials.
#[derive(Clone)]
pub struct CredentialDiscovery {
    target: ProcessTarget,
    table: Arc<dyn ProcessTable>,
}

impl CredentialDiscovery {
    pub fn new(target: ProcessTarget) -> Self {
        Self::with_table(target, Arc::new(SysinfoProcessTable::default()))
    }

    pub fn with_table(target: ProcessTarget, table: Arc<dyn ProcessTable>) -> Self {
        Self { target, table }
    }

    pub fn target(&self) -> &ProcessTarget {
        &self.target
    }

    pub fn table(&self) -> Arc<dyn ProcessTable> {
        Arc::clone(&self.table)
    }

    /// Whether the target process is present at all.
    pub fn is_running(&self) -> bool {
        self.table.is_running(&self.target.process_names)
    }

    /// Scan the process table and extract credentials.
    ///
    /// Returns [`Error::ClientNotFound`] when no matching process exists or
    /// when none of them carries all three flags.
    pub fn discover(&self) -> Result<Credentials, Error> {
        let processes = self.table.find(&self.target.process_names);
        if processes.is_empty() {
            debug!(names = ?self.target.process_names, "client process not running");
            return Err(Error::ClientNotFound {
                reason: format!("no process named {:?}", self.target.process_names),
            });
        }

        let mut last_missing = "";
        for process in &processes {
            trace!(pid = process.pid, name = %process.name, "inspecting process");
            match extract_credentials(&self.target, &process.cmd) {
                Ok(creds) => {
                    debug!(port = creds.port, pid = creds.process_id, "discovered client credentials");
                    return Ok(creds);
                }
                Err(missing) => last_missing = missing,
            }
        }

        debug!(flag = last_missing, "client process found but credentials incomplete");
        Err(Error::ClientNotFound {
            reason: format!("missing or empty --{last_missing} flag"),
        })
    }
}

/// Parse all `--flag=value` pairs out of an argument vector.
///
/// Arguments are joined first because some platforms report the whole
/// command line as a single string.
pub fn parse_flags(cmd: &[String]) -> HashMap<String, String> {
    let joined = cmd.join(" ");
    FLAG_PATTERN
        .captures_iter(&joined)
        .filter_map(|caps| {
            let key = caps.get(1)?.as_str().to_owned();
            let value = caps.get(2).or_else(|| caps.get(3))?.as_str().to_owned();
            Some((key, value))
        })
        .collect()
}

/// Extract credentials from a command line; `Err` names the missing flag.
fn extract_credentials(
    target: &ProcessTarget,
    cmd: &[String],
) -> Result<Credentials, &'static str> {
    let flags = parse_flags(cmd);
    let lookup = |flag: &str| flags.get(flag).filter(|v| !v.is_empty()).cloned();

    let port = lookup(&target.port_flag)
        .and_then(|v| v.parse::<u16>().ok())
        .ok_or("port")?;
    let token = lookup(&target.token_flag).ok_or("auth-token")?;
    let pid = lookup(&target.pid_flag)
        .and_then(|v| v.parse::<u32>().ok())
        .ok_or("pid")?;

    Ok(Credentials {
        port,
        auth_token: SecretString::from(token),
        process_id: pid,
    })
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn league(cmd: &[&str]) -> ProcessInfo {
        ProcessInfo {
            pid: 4242,
            name: "LeagueClientUx.exe".into(),
            cmd: cmd.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    #[test]
    fn discovers_all_three_flags() {
        let table = StaticProcessTable(vec![league(&[
            "LeagueClientUx.exe",
            "--remoting-auth-token=abc-123_XYZ",
            "--app-port=51234",
            "--app-pid=9001",
        ])]);
        let discovery = CredentialDiscovery::with_table(ProcessTarget::league_client(), Arc::new(table));

        let creds = discovery.discover().expect("credentials");
        assert_eq!(creds.port, 51234);
        assert_eq!(creds.process_id, 9001);
        assert_eq!(creds.auth_token.expose_secret(), "abc-123_XYZ");
    }

    #[test]
    fn quoted_values_and_single_string_command_lines() {
        let table = StaticProcessTable(vec![league(&[
            r#""C:/Riot Games/LeagueClientUx.exe" "--app-port=6000" "--remoting-auth-token=tok" --app-pid=77"#,
        ])]);
        let discovery = CredentialDiscovery::with_table(ProcessTarget::league_client(), Arc::new(table));

        let creds = discovery.discover().expect("credentials");
        assert_eq!(creds.port, 6000);
        assert_eq!(creds.process_id, 77);
    }

    #[test]
    fn missing_process_is_not_found() {
        let discovery =
            CredentialDiscovery::with_table(ProcessTarget::league_client(), Arc::new(StaticProcessTable(vec![])));
        assert!(!discovery.is_running());
        let err = discovery.discover().expect_err("no process");
        assert!(err.is_not_running());
    }

    #[test]
    fn missing_or_empty_flag_is_not_found() {
        let table = StaticProcessTable(vec![league(&[
            "--app-port=51234",
            "--remoting-auth-token=",
            "--app-pid=9001",
        ])]);
        let discovery = CredentialDiscovery::with_table(ProcessTarget::league_client(), Arc::new(table));
        assert!(discovery.is_running());

        let err = discovery.discover().expect_err("empty token");
        assert!(matches!(err, Error::ClientNotFound { ref reason } if reason.contains("auth-token")));
    }

    #[test]
    fn second_instance_with_flags_wins() {
        let table = StaticProcessTable(vec![
            league(&["--app-port=1"]),
            league(&["--app-port=2", "--remoting-auth-token=t", "--app-pid=3"]),
        ]);
        let discovery = CredentialDiscovery::with_table(ProcessTarget::league_client(), Arc::new(table));
        assert_eq!(discovery.discover().expect("credentials").port, 2);
    }

    #[test]
    fn name_matching_ignores_case_and_exe_suffix() {
        let names = vec!["LeagueClientUx".to_owned()];
        assert!(name_matches("leagueclientux.EXE", &names));
        assert!(!name_matches("LeagueClient", &names));
    }

    #[test]
    fn lookups_within_max_age_share_one_scan() {
        let table = SysinfoProcessTable::with_max_age(Duration::from_secs(60));
        let first = table.snapshot();
        let second = table.snapshot();
        assert!(Arc::ptr_eq(&first, &second));

        let uncached = SysinfoProcessTable::with_max_age(Duration::ZERO);
        assert!(!Arc::ptr_eq(&uncached.snapshot(), &uncached.snapshot()));
    }
}
