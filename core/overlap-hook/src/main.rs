//! overlap-hook: CLI hook handler for Overlap session tracking.
//!
//! Called by Claude Code hooks configured in the plugin's `hooks.json`.
//!
//! ## Subcommands
//!
//! - `handle`: Main hook handler, reads JSON from stdin. Always exits 0.
//! - `config`: Stores server URL and tokens in `~/.claude/overlap/config.json`
//! - `status`: Shows effective config, current session, and server reachability

mod config_cmd;
mod handle;
mod log_upload;
mod logging;
mod report;

use std::io;

use clap::{Parser, Subcommand};
use overlap_core::{HttpTransport, OverlapApi, StateStore};

#[derive(Parser)]
#[command(name = "overlap-hook")]
#[command(about = "Overlap session tracker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle a hook event (reads JSON from stdin)
    Handle,

    /// Save server URL and tokens (prints the stored config when no flags are given)
    Config(config_cmd::ConfigArgs),

    /// Show configuration, current session, and server status
    Status,
}

fn main() {
    let store = StateStore::open_default();
    let logging = logging::init(store.as_ref().ok().map(StateStore::log_dir));
    let cli = Cli::parse();

    match cli.command {
        Commands::Handle => {
            // Tracking is never allowed to block the host tool - failures are reported, exit stays 0
            handle::run(&logging.uploads);
        }
        Commands::Config(args) => {
            let result = store.and_then(|store| {
                config_cmd::run_config(&store, args, &mut io::stdout().lock())
            });
            if let Err(e) = result {
                report::report("Failed to save config", &e);
                std::process::exit(1);
            }
        }
        Commands::Status => {
            let store = match store {
                Ok(store) => store,
                Err(e) => {
                    report::report("Cannot locate state directory", &e);
                    std::process::exit(1);
                }
            };
            let config = store.load_config();
            match HttpTransport::new(config.clone()) {
                Ok(transport) => {
                    let api = OverlapApi::new(transport);
                    config_cmd::run_status(&store, &config, &api, &mut io::stdout().lock());
                }
                Err(e) => report::report("Cannot create HTTP client", &e),
            }
        }
    }
}
