//! `config` and `status` subcommands.

use std::io::Write;

use clap::Args;
use overlap_core::config::mask_token;
use overlap_core::{Config, OverlapApi, Result, StateStore, Transport};

#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Overlap server base URL (e.g. https://overlap.example.com)
    #[arg(long)]
    pub server_url: Option<String>,

    /// Team token shared by everyone on the team
    #[arg(long)]
    pub team_token: Option<String>,

    /// Personal user token
    #[arg(long)]
    pub user_token: Option<String>,
}

impl ConfigArgs {
    fn into_update(self) -> Config {
        let clean = |value: Option<String>| value.map(|v| v.trim().to_string());
        Config {
            server_url: clean(self.server_url),
            team_token: clean(self.team_token),
            user_token: clean(self.user_token),
        }
    }
}

/// Merges the given values into `config.json`. With no flags, prints the stored config.
pub fn run_config(store: &StateStore, args: ConfigArgs, out: &mut impl Write) -> Result<()> {
    let update = args.into_update();
    let mut config = store.stored_config();

    if update == Config::default() {
        print_config(&config, out);
        return Ok(());
    }

    config.merge(update);
    store.save_config(&config)?;
    eprintln!("[Overlap] Config: Saved config to {}", store.config_path().display());

    print_config(&config, out);
    if !config.is_configured() {
        let _ = writeln!(
            out,
            "Still missing values: server URL, team token and user token are all required."
        );
    }
    Ok(())
}

/// Prints effective config, the current session, and whether the server answers.
pub fn run_status<T: Transport>(
    store: &StateStore,
    config: &Config,
    api: &OverlapApi<T>,
    out: &mut impl Write,
) {
    let _ = writeln!(out, "State directory: {}", store.root().display());
    print_config(config, out);
    let _ = writeln!(
        out,
        "Current session: {}",
        store.current_session().as_deref().unwrap_or("(none)")
    );

    if config.server_url.as_deref().map_or(true, str::is_empty) {
        return;
    }
    match api.version() {
        Ok(version) => {
            let _ = writeln!(out, "Server: reachable (version {})", version.version);
        }
        Err(err) => {
            tracing::warn!(error = %err, "Status check failed");
            let _ = writeln!(out, "Server: unreachable ({})", err);
        }
    }
}

fn print_config(config: &Config, out: &mut impl Write) {
    let _ = writeln!(
        out,
        "Server URL: {}",
        config.server_url.as_deref().unwrap_or("(not set)")
    );
    let _ = writeln!(out, "Team token: {}", mask_token(config.team_token.as_deref()));
    let _ = writeln!(out, "User token: {}", mask_token(config.user_token.as_deref()));
    let _ = writeln!(
        out,
        "Configured: {}",
        if config.is_configured() { "yes" } else { "no" }
    );
}
