//! Demoreel CLI - inspect, scan and benchmark demo files
//!
//! # Commands
//!
//! - `demoreel list` - Print a demo's header
//! - `demoreel scan` - Index important events and aggregate one pattern
//! - `demoreel highlights` - Compose a player's highlight reel
//! - `demoreel play` - Play a demo headless and report what the client saw
//! - `demoreel timedemo` - Benchmark a demo and append the CSV result row
//!
//! # Usage
//!
//! ```bash
//! demoreel list match.dem
//! demoreel scan match.dem --events important.toml --schema schema.toml --pattern player_death
//! demoreel highlights match.dem --events important.toml --schema schema.toml --subject 76561198000000001
//! demoreel timedemo match.dem --label nightly --results-dir results
//! ```
//!
//! Settings come from `demoreel.toml` in the platform config directory unless
//! `--config` names another file.

mod highlights;
mod list;
mod play;
mod scan;
mod session;
mod timedemo;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::session::Session;

/// Demoreel CLI - demo record and replay tooling
#[derive(Parser)]
#[command(name = "demoreel")]
#[command(about = "Inspect, scan and benchmark demo files")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to demoreel.toml in the config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a demo's header without playing it
    List(list::ListArgs),

    /// Index important events and aggregate one event pattern
    Scan(scan::ScanArgs),

    /// Compose the highlight reel of one player
    Highlights(highlights::HighlightsArgs),

    /// Play a demo headless and report what the client received
    Play(play::PlayArgs),

    /// Benchmark a demo and append the result to a CSV file
    Timedemo(timedemo::TimedemoArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let session = Session::new(cli.config.as_deref(), cli.json)?;

    match cli.command {
        Commands::List(args) => list::execute(args, &session),
        Commands::Scan(args) => scan::execute(args, &session),
        Commands::Highlights(args) => highlights::execute(args, &session),
        Commands::Play(args) => play::execute(args, &session),
        Commands::Timedemo(args) => timedemo::execute(args, &session),
    }
}
