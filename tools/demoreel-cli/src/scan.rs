//! Scan command - index important events

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use demoreel_core::scan_demo;

use crate::session::{Session, demo_store, load_codec, load_events};

/// Arguments for the scan command
#[derive(Args)]
pub struct ScanArgs {
    /// Demo file (.dem)
    pub demo: PathBuf,

    /// Important event table (TOML)
    #[arg(short, long)]
    pub events: PathBuf,

    /// Game event schema (TOML)
    #[arg(short, long)]
    pub schema: PathBuf,

    /// Aggregate statistics for this event name
    #[arg(short, long)]
    pub pattern: Option<String>,
}

pub fn execute(args: ScanArgs, session: &Session) -> Result<()> {
    let events = load_events(&args.events)?;
    let codec = load_codec(&args.schema)?;
    let (store, name) = demo_store(&args.demo)?;

    let report = scan_demo(
        &store,
        &name,
        args.pattern.as_deref(),
        &events,
        &codec,
        &session.config,
    )
    .with_context(|| format!("Failed to scan demo: {}", args.demo.display()))?;

    if session.json {
        return session.print_json(&report);
    }

    println!("=== Scan: {} ===", args.demo.display());
    println!("  Packets:      {}", report.packets);
    println!("  Highest tick: {}", report.highest_tick);
    if report.healed {
        println!("  Header totals were rebuilt from the records");
    }
    if report.incomplete {
        println!("  WARNING: header is incomplete");
    }

    println!();
    println!("=== Important ticks ({}) ===", report.index.len());
    for line in report.index.describe(&events) {
        println!("  {line}");
    }

    if let Some(stats) = &report.pattern {
        println!();
        println!("=== Pattern: {} ===", stats.event);
        println!("  Occurrences: {}", stats.occurrences);
        if let (Some(first), Some(last)) = (stats.first_tick, stats.last_tick) {
            println!("  Ticks:       {first}..={last}");
        }
        for (key, max) in &stats.maxima {
            println!("  max {key}: {max}");
        }
    }
    Ok(())
}
