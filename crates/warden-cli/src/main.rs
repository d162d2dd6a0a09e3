//! Warden CLI: the `warden` command.

mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "WARDEN_LOG";

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = support::load_context_or_exit(&cli.root, cli.config.as_deref());

    match cli.command {
        Commands::Scan { json } => commands::scan::run(&ctx, json),

        Commands::Heal { fix, json } => commands::heal::run(&ctx, fix, json),

        Commands::Patterns { json } => commands::patterns::run(&ctx, json),

        Commands::Monitor { auto_prevent, json } => {
            commands::monitor::run(&ctx, auto_prevent, json)
        }

        Commands::ValidateMechanisms { catalog, json } => {
            commands::validate_mechanisms::run(&ctx, catalog, json)
        }
    }
}
