//! `riftlink credentials`: discover local API credentials.

use secrecy::ExposeSecret;

use riftlink_api::{CredentialDiscovery, ProcessTarget};

use crate::cli::{CredentialsArgs, GlobalOpts, Target};
use crate::error::CliError;
use crate::output::{self, detail};

fn process_target(target: Target) -> ProcessTarget {
    match target {
        Target::Riot => ProcessTarget::riot_client(),
        Target::League => ProcessTarget::league_client(),
    }
}

pub fn handle(args: &CredentialsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let discovery = CredentialDiscovery::new(process_target(args.target));
    let creds = discovery.discover()?;
    let color = output::should_color(global.color);

    let token = if args.show_token {
        creds.auth_token.expose_secret().to_owned()
    } else {
        "****".to_owned()
    };

    for line in [
        detail("pid", &creds.process_id.to_string(), color),
        detail("port", &creds.port.to_string(), color),
        detail("base url", &format!("https://127.0.0.1:{}", creds.port), color),
        detail("token", &token, color),
    ] {
        output::print_line(&line);
    }
    Ok(())
}
