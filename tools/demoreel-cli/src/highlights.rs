//! Highlights command - compose a player's highlight reel

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use demoreel_core::compose_highlights;

use crate::session::{Session, demo_store, load_codec, load_events};

/// Arguments for the highlights command
#[derive(Args)]
pub struct HighlightsArgs {
    /// Demo file (.dem)
    pub demo: PathBuf,

    /// Important event table (TOML)
    #[arg(short, long)]
    pub events: PathBuf,

    /// Game event schema (TOML)
    #[arg(short, long)]
    pub schema: PathBuf,

    /// Xuid of the player the reel follows
    #[arg(long)]
    pub subject: u64,

    /// Collect the subject's deaths instead of kills
    #[arg(long)]
    pub lowlights: bool,
}

pub fn execute(args: HighlightsArgs, session: &Session) -> Result<()> {
    let events = load_events(&args.events)?;
    let codec = load_codec(&args.schema)?;
    let (store, name) = demo_store(&args.demo)?;

    let report = compose_highlights(
        &store,
        &name,
        &events,
        &codec,
        args.subject,
        args.lowlights,
        &session.config,
    )
    .with_context(|| format!("Failed to compose highlights: {}", args.demo.display()))?;

    if session.json {
        return session.print_json(&report);
    }

    let kind = if report.lowlights { "Lowlights" } else { "Highlights" };
    println!("=== {kind}: {} ===", args.demo.display());
    println!("  Subject:         {}", report.subject);
    println!("  Important ticks: {}", report.important_ticks);
    println!("  Segments:        {}", report.segments.len());
    for line in &report.lines {
        println!("  {line}");
    }
    Ok(())
}
