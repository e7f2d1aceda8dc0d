//! Terminal rendering for monitor events, credentials and status.

use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Local};
use owo_colors::OwoColorize;

use riftlink_core::{ClientState, MonitorEvent};

use crate::cli::ColorMode;

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Print one line to stdout, ignoring broken pipes.
pub fn print_line(line: &str) {
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{line}");
}

// ── State & events ───────────────────────────────────────────────────

pub fn paint_state(state: ClientState, color: bool) -> String {
    let name = state.as_ref();
    if !color {
        return name.to_owned();
    }
    match state {
        ClientState::LoggedIn => name.green().bold().to_string(),
        ClientState::LoginReady => name.cyan().to_string(),
        ClientState::WaitingLogin | ClientState::WaitingCaptcha => name.yellow().to_string(),
        ClientState::Closed => name.dimmed().to_string(),
    }
}

/// One human-readable line per event.
pub fn event_line(event: &MonitorEvent, at: DateTime<Local>, color: bool) -> String {
    let stamp = at.format("%H:%M:%S").to_string();
    let stamp = if color {
        stamp.dimmed().to_string()
    } else {
        stamp
    };

    let body = match event {
        MonitorEvent::ClientStateChanged(state) => {
            format!("client state  {}", paint_state(*state, color))
        }
        MonitorEvent::ManagedAccountChanged(managed) => {
            let label = if *managed { "managed" } else { "unmanaged" };
            if color && *managed {
                format!("account       {}", label.magenta())
            } else {
                format!("account       {label}")
            }
        }
        MonitorEvent::MonitoringStarted { username } => {
            if color {
                format!("monitoring    {}", username.bold())
            } else {
                format!("monitoring    {username}")
            }
        }
        MonitorEvent::StartWebsocketHandlers => "websocket     handlers started".to_owned(),
        MonitorEvent::StopWebsocketHandlers => "websocket     handlers stopped".to_owned(),
    };
    format!("{stamp}  {body}")
}

/// JSON line for `watch --json`.
pub fn event_json(event: &MonitorEvent, at: DateTime<Local>) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(event)?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("at".into(), serde_json::Value::String(at.to_rfc3339()));
    }
    serde_json::to_string(&value)
}

/// `key  value` detail row.
pub fn detail(key: &str, value: &str, color: bool) -> String {
    if color {
        format!("{:<14}{value}", key.bold())
    } else {
        format!("{key:<14}{value}")
    }
}
