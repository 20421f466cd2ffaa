//! Timedemo command - benchmark playback

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use demoreel_core::benchmark;
use demoreel_core::replay::runtime::BenchmarkEnvironment;

use crate::session::{Session, demo_store};

/// Arguments for the timedemo command
#[derive(Args)]
pub struct TimedemoArgs {
    /// Demo file (.dem)
    pub demo: PathBuf,

    /// Label written to the stats label column
    #[arg(short, long, default_value = "default")]
    pub label: String,

    /// Directory receiving the results CSV
    #[arg(short, long, default_value = ".")]
    pub results_dir: PathBuf,
}

fn environment() -> BenchmarkEnvironment {
    let host_name = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    BenchmarkEnvironment {
        host_name,
        renderer: "headless".to_string(),
        command_line: std::env::args().collect::<Vec<_>>().join(" "),
        ..Default::default()
    }
}

pub fn execute(args: TimedemoArgs, session: &Session) -> Result<()> {
    let (store, name) = demo_store(&args.demo)?;
    let results = benchmark(
        Box::new(store),
        &name,
        &args.label,
        &args.results_dir,
        &environment(),
        &session.config,
    )
    .with_context(|| format!("Failed to benchmark demo: {}", args.demo.display()))?;

    if session.json {
        return session.print_json(&results);
    }

    println!("=== Timedemo: {} ===", args.demo.display());
    println!("  {results}");
    println!("  Results appended in {}", args.results_dir.display());
    Ok(())
}
