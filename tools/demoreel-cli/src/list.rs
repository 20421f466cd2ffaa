//! List command - print a demo's header

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use demoreel_core::list_demo;

use crate::session::{Session, demo_store};

/// Arguments for the list command
#[derive(Args)]
pub struct ListArgs {
    /// Demo file (.dem)
    pub demo: PathBuf,
}

pub fn execute(args: ListArgs, session: &Session) -> Result<()> {
    let (store, name) = demo_store(&args.demo)?;
    let header = list_demo(&store, &name)
        .with_context(|| format!("Failed to read demo header: {}", args.demo.display()))?;

    if session.json {
        return session.print_json(&header);
    }

    println!("=== {} ===", args.demo.display());
    println!("  Demo protocol:    {}", header.demo_protocol);
    println!("  Network protocol: {}", header.network_protocol);
    println!("  Server:           {}", header.server_name);
    println!("  Client:           {}", header.client_name);
    println!("  Map:              {}", header.map_name);
    println!("  Game directory:   {}", header.game_directory);
    println!("  Playback time:    {:.3}s", header.playback_time);
    println!("  Ticks:            {}", header.playback_ticks);
    println!("  Frames:           {}", header.playback_frames);
    match header.tick_interval() {
        Some(interval) => println!("  Tick rate:        {:.1}/s", 1.0 / interval),
        None => println!("  Tick rate:        unknown (header not finalized)"),
    }
    Ok(())
}
