//! rc - configuration reload coordinator
//!
//! CLI entry point for replaying notification scenarios.

use std::fs;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use reloadcoord::cli::{Cli, Command, OutputFormat};
use reloadcoord::config::{Config, LoggingConfig};
use reloadcoord::coordinator::ReloadEvent;
use reloadcoord::scenario::{ReplayEntry, Scenario, replay};

fn setup_logging(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let log_dir = logging.log_dir();
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("reloadcoord.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging needs the config for its directory, so load first
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(&config.logging, cli.verbose).context("Failed to setup logging")?;

    match cli.command {
        Command::Replay { scenario, format } => cmd_replay(&config, &scenario, format).await,
        Command::ShowConfig => cmd_show_config(&config),
    }
}

/// Replay a scenario file and print its events and reloads
async fn cmd_replay(config: &Config, path: &std::path::Path, format: OutputFormat) -> Result<()> {
    let scenario = Scenario::load(path)?;
    let outcome = replay(&scenario, config.coordinator.clone()).await?;

    match format {
        OutputFormat::Json => {
            for entry in &outcome.entries {
                println!("{}", serde_json::to_string(entry)?);
            }
            println!("{}", serde_json::to_string(&outcome.metrics)?);
        }
        OutputFormat::Text => {
            for entry in &outcome.entries {
                print_entry(entry);
            }
            let m = &outcome.metrics;
            println!();
            println!(
                "{} {} notifications, {} flushes, {} reloads ({} failed), {} excluded, {} unresolved",
                "Summary:".bold(),
                m.notifications_received,
                m.flushes,
                m.reloads_invoked,
                m.reload_failures,
                m.ids_excluded,
                m.ids_unresolved
            );
        }
    }
    Ok(())
}

fn print_entry(entry: &ReplayEntry) {
    match entry {
        ReplayEntry::Reload { at, user, server } => {
            println!(
                "{} {} {} <- {}",
                at.format("%H:%M:%S%.3f").to_string().dimmed(),
                "reload".green().bold(),
                user.cyan(),
                server
            );
        }
        ReplayEntry::Event { at, event } => {
            let when = at.format("%H:%M:%S%.3f").to_string().dimmed();
            match event {
                ReloadEvent::Diagnostic { message } => println!("{} {}", when, message.dimmed()),
                ReloadEvent::FlushCompleted { reloads } => {
                    println!("{} {} ({} reloads)", when, "flush".yellow().bold(), reloads)
                }
                ReloadEvent::ConnectionStateChanged { connected } => {
                    let state = if *connected { "connected".green() } else { "disconnected".red() };
                    println!("{} {} {}", when, "feed".blue().bold(), state);
                }
            }
        }
    }
}

fn cmd_show_config(config: &Config) -> Result<()> {
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}
