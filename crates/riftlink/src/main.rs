mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose, cli.global.log_json);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, json: bool) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let path = commands::config_cmd::effective_path(&cli.global);

    // `config` must work even when the file is broken.
    let cfg = match riftlink_config::load_config_from(&path) {
        Ok(cfg) => cfg,
        Err(e) if matches!(cli.command, Command::Config(_)) => {
            tracing::warn!(error = %e, "config failed to load; using defaults");
            riftlink_config::Config::default()
        }
        Err(e) => return Err(e.into()),
    };

    tracing::debug!(command = ?cli.command, config = %path.display(), "dispatching command");
    commands::dispatch(cli.command, cfg, &cli.global).await
}
