//! Config subcommand handlers.

use std::path::PathBuf;

use riftlink_config::{self as config, Config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// Config file in effect: `--config` or the platform default.
pub fn effective_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config::config_path)
}

/// Render config as TOML, masking the plaintext API key.
fn format_config_redacted(cfg: &Config) -> Result<String, CliError> {
    let mut redacted = cfg.clone();
    if redacted.backend.api_key.is_some() {
        redacted.backend.api_key = Some("****".into());
    }
    toml::to_string_pretty(&redacted).map_err(|e| CliError::Toml(e.to_string()))
}

pub fn handle(args: &ConfigArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            output::print_line(format_config_redacted(cfg)?.trim_end());
            Ok(())
        }
        ConfigCommand::Path => {
            output::print_line(&effective_path(global).display().to_string());
            Ok(())
        }
        ConfigCommand::Init { force } => {
            let path = effective_path(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            config::save_config_to(&Config::default(), &path)?;
            output::print_line(&format!("wrote {}", path.display()));
            Ok(())
        }
    }
}
