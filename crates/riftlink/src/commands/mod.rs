//! Command handlers, one module per subcommand.

pub mod config_cmd;
pub mod credentials;
pub mod status;
pub mod util;
pub mod watch;

use riftlink_config::Config;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Route a parsed command to its handler.
pub async fn dispatch(cmd: Command, cfg: Config, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(&args, &cfg, global).await,
        Command::Credentials(args) => credentials::handle(&args, global),
        Command::Status => status::handle(&cfg, global).await,
        Command::Config(args) => config_cmd::handle(&args, &cfg, global),
    }
}
