//! `riftlink status`: one sample, one derived state.

use riftlink_config::Config;
use riftlink_core::{AuthSignal, ClientState};

use crate::cli::GlobalOpts;
use crate::commands::util::build_session;
use crate::error::CliError;
use crate::output::{self, detail};

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn auth_label(auth: AuthSignal) -> &'static str {
    match auth {
        AuthSignal::Success => "logged in",
        AuthSignal::Pending => "waiting for login",
        AuthSignal::Unavailable => "unavailable",
    }
}

pub async fn handle(cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let session = build_session(cfg, false)?;
    let color = output::should_color(global.color);

    let sample = session.monitor.sample(ClientState::Closed).await;
    let state = ClientState::Closed.next(&sample);

    for line in [
        detail("launcher", yes_no(sample.client_running), color),
        detail("game client", yes_no(sample.game_client_running), color),
        detail("in game", yes_no(sample.playing), color),
        detail("auth", auth_label(sample.auth), color),
        detail("state", &output::paint_state(state, color), color),
    ] {
        output::print_line(&line);
    }
    Ok(())
}
