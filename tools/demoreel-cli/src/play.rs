//! Play command - headless playback
//!
//! Plays the demo through a client that only counts what it receives. With
//! `--subject` the player first indexes the demo and plays the subject's
//! highlight reel instead.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use demoreel_core::replay::runtime::{
    HeadlessConfig, HighlightRequest, PlaybackOptions, PlaybackReport, parse_goto_target,
};
use demoreel_core::replay::scan::ImportanceScanner;
use demoreel_core::{list_demo, play_headless};

use crate::session::{Session, demo_store, load_codec, load_events};

/// Arguments for the play command
#[derive(Args)]
pub struct PlayArgs {
    /// Demo file (.dem)
    pub demo: PathBuf,

    /// Start at a tick, a percentage (`50%`) or minutes (`2.5m`)
    #[arg(long)]
    pub start: Option<String>,

    /// Play the highlight reel of this xuid (needs --events and --schema)
    #[arg(long, requires = "events")]
    pub subject: Option<u64>,

    /// With --subject, play deaths instead of kills
    #[arg(long, requires = "subject")]
    pub lowlights: bool,

    /// Important event table (TOML)
    #[arg(short, long, requires = "schema")]
    pub events: Option<PathBuf>,

    /// Game event schema (TOML)
    #[arg(short, long)]
    pub schema: Option<PathBuf>,

    /// Stop after this many frames (0 = no limit)
    #[arg(long, default_value = "0")]
    pub max_frames: u64,

    /// Timeout in seconds
    #[arg(long, default_value = "300")]
    pub timeout: u64,
}

pub fn execute(args: PlayArgs, session: &Session) -> Result<()> {
    let (store, name) = demo_store(&args.demo)?;
    let header = list_demo(&store, &name)
        .with_context(|| format!("Failed to read demo header: {}", args.demo.display()))?;

    let starting_tick = match &args.start {
        Some(start) => {
            let interval = header
                .tick_interval()
                .unwrap_or(session.config.playback.headless_tick_interval);
            let tick = parse_goto_target(start, header.playback_ticks, interval)
                .with_context(|| format!("Invalid start position: {start}"))?;
            Some(tick)
        }
        None => None,
    };

    let headless = HeadlessConfig {
        max_frames: args.max_frames,
        timeout_secs: args.timeout,
        ..Default::default()
    };
    let mut options = PlaybackOptions {
        starting_tick,
        ..Default::default()
    };

    let report = match (args.subject, &args.events, &args.schema) {
        (Some(subject), Some(events), Some(schema)) => {
            let events = load_events(events)?;
            let codec = load_codec(schema)?;
            let scanner = ImportanceScanner::new(&events, &codec, &codec)
                .strict(session.config.validation.strict)
                .tick_interval(session.config.playback.headless_tick_interval);
            options.highlight = Some(HighlightRequest {
                subject,
                lowlights: args.lowlights,
            });
            play_headless(
                Box::new(store),
                &name,
                options,
                Some(&scanner),
                headless,
                &session.config,
            )
        }
        _ => play_headless(
            Box::new(store),
            &name,
            options,
            None,
            headless,
            &session.config,
        ),
    }
    .with_context(|| format!("Failed to play demo: {}", args.demo.display()))?;

    if session.json {
        session.print_json(&report)?;
    } else {
        print_report(&args, &report);
    }

    if let Some(error) = &report.error {
        anyhow::bail!("Playback aborted: {error}");
    }
    Ok(())
}

fn print_report(args: &PlayArgs, report: &PlaybackReport) {
    println!("=== Playback: {} ===", args.demo.display());
    if report.healed {
        println!("  Header totals were rebuilt from the records");
    }
    if let Some(warning) = &report.warning {
        println!("  Warning:      {warning}");
    }
    println!("  Frames:       {}", report.frames);
    println!("  Packets:      {}", report.packets);
    println!("  Final tick:   {}", report.final_tick);
    println!("  Completed:    {}", report.completed);
    if let Some(ms) = report.duration_ms {
        println!("  Duration:     {ms}ms");
    }

    let client = &report.client;
    println!();
    println!("=== Client ===");
    println!("  Payloads:       {} ({} bytes)", client.payloads, client.payload_bytes);
    println!("  Schemas:        {}", client.schemas);
    println!("  String tables:  {}", client.string_tables);
    println!("  User commands:  {}", client.user_commands);
    println!("  Custom data:    {}", client.custom_data);
    println!("  Restarts:       {}", client.restarts);
    for command in &client.console_commands {
        println!("  > {command}");
    }

    if !report.highlights.is_empty() {
        println!();
        println!("=== Highlights ({}) ===", report.highlights.len());
        for segment in &report.highlights {
            println!(
                "  ticks {}..={} ({} events, seek {} ff {})",
                segment.first_event_tick,
                segment.last_event_tick,
                segment.event_count,
                segment.seek_to_tick,
                segment.fast_forward_to_tick
            );
        }
    }
}
