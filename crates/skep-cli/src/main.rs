mod cli;
mod cmd;
mod config_gen;
mod dispatch;
mod format;
mod progress;
mod signal;
mod table;

use clap::Parser;

use skep_core::config;
use skep_types::SkepError;

use cli::{Cli, Commands};
use config_gen::run_config;
use dispatch::dispatch_command;
use progress::ProgressAwareStderr;

fn main() {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(ProgressAwareStderr)
        .init();

    // `config` needs no config file; handle it before resolution.
    if let Commands::Config { init, dest } = &cli.command {
        if let Err(e) = run_config(*init, dest.as_deref(), cli.config.as_deref()) {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
        return;
    }

    let source = match config::resolve_config_path(cli.config.as_deref()) {
        Some(s) => s,
        None => {
            eprintln!("Error: no configuration file found.");
            eprintln!("Searched:");
            for (path, level) in config::default_config_search_paths() {
                eprintln!("  {} ({})", path.display(), level);
            }
            eprintln!();
            eprintln!("Run `skep config --init` to generate a starter config file.");
            std::process::exit(2);
        }
    };

    tracing::info!("Using config: {source}");

    let config = match config::load_config(source.path()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    let cancel = signal::install_signal_handlers();
    tracing::debug!(command = cli.command.name(), "dispatching");

    match dispatch_command(&cli.command, config, &cancel) {
        Ok(false) => {}
        Ok(true) => std::process::exit(1),
        Err(SkepError::Cancelled) => {
            eprintln!("cancelled");
            std::process::exit(130);
        }
        Err(e @ SkepError::Config(_)) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
