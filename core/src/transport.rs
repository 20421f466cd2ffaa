//! Transport surface
//!
//! File-level operations for shells such as the CLI. Every call opens its own
//! reader or player, so listing or scanning a demo never disturbs one that is
//! being played.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::DemoConfig;
use crate::error::{DemoError, Result};
use crate::host::FileStore;
use crate::replay::binary::DemoReader;
use crate::replay::runtime::{
    BenchmarkEnvironment, HeadlessClient, HeadlessConfig, HeadlessRunner, PlaybackOptions,
    PlaybackReport, Player, TimeDemoResults, append_results,
};
use crate::replay::scan::{
    EventSource, HighlightComposer, HighlightSegment, ImportanceScanner, ImportantEventTable,
    MessageDecoder, ScanReport, describe_segments,
};
use crate::replay::types::DemoHeader;

pub use crate::replay::runtime::next_incremental_name;

/// Highlight reel composed from a fresh scan
#[derive(Debug, Clone, Serialize)]
pub struct HighlightReport {
    pub demo: PathBuf,
    pub subject: u64,
    pub lowlights: bool,
    /// Entries in the important-tick index the reel was built from
    pub important_ticks: usize,
    pub segments: Vec<HighlightSegment>,
    pub lines: Vec<String>,
}

/// Read the header of `path` without playing it
pub fn list_demo(store: &dyn FileStore, path: &Path) -> Result<DemoHeader> {
    let stream = store.open(path)?;
    let mut reader = DemoReader::new(stream)?;
    reader.read_header()
}

fn scanner<'a, C: EventSource + MessageDecoder>(
    events: &'a ImportantEventTable,
    codec: &'a C,
    config: &DemoConfig,
) -> ImportanceScanner<'a> {
    ImportanceScanner::new(events, codec, codec)
        .strict(config.validation.strict)
        .tick_interval(config.playback.headless_tick_interval)
}

/// Index the important events of `path` and aggregate `pattern`
pub fn scan_demo<C: EventSource + MessageDecoder>(
    store: &dyn FileStore,
    path: &Path,
    pattern: Option<&str>,
    events: &ImportantEventTable,
    codec: &C,
    config: &DemoConfig,
) -> Result<ScanReport> {
    let stream = store.open(path)?;
    let mut reader = DemoReader::new(stream)?;
    let report = scanner(events, codec, config).scan(&mut reader, None, pattern)?;
    tracing::info!(
        path = %path.display(),
        important_ticks = report.index.len(),
        packets = report.packets,
        healed = report.healed,
        "Scanned demo"
    );
    Ok(report)
}

/// Scan `path` and compose the highlight reel of `subject`
pub fn compose_highlights<C: EventSource + MessageDecoder>(
    store: &dyn FileStore,
    path: &Path,
    events: &ImportantEventTable,
    codec: &C,
    subject: u64,
    lowlights: bool,
    config: &DemoConfig,
) -> Result<HighlightReport> {
    let scan = scan_demo(store, path, None, events, codec, config)?;
    let interval = scan
        .header
        .tick_interval()
        .unwrap_or(config.playback.headless_tick_interval);
    let composer = HighlightComposer::from_config(&config.highlights, interval);
    let segments = composer.compose(&scan.index, subject, lowlights, scan.header.playback_ticks);

    Ok(HighlightReport {
        demo: path.to_path_buf(),
        subject,
        lowlights,
        important_ticks: scan.index.len(),
        lines: describe_segments(&segments),
        segments,
    })
}

fn headless_player(
    store: Box<dyn FileStore>,
    path: &Path,
    environment: Option<BenchmarkEnvironment>,
    config: &DemoConfig,
) -> Result<Player<HeadlessClient>> {
    let header = list_demo(store.as_ref(), path)?;
    let interval = header
        .tick_interval()
        .unwrap_or(config.playback.headless_tick_interval);
    let mut client = HeadlessClient::new(interval);
    if let Some(environment) = environment {
        client = client.with_environment(environment);
    }
    Ok(Player::new(client, store, config.clone()))
}

/// Play `path` to its end without a game client.
///
/// A highlight request in `options` needs `scanner` to index the demo first;
/// without it playback is linear.
pub fn play_headless(
    store: Box<dyn FileStore>,
    path: &Path,
    options: PlaybackOptions,
    scanner: Option<&ImportanceScanner<'_>>,
    headless: HeadlessConfig,
    config: &DemoConfig,
) -> Result<PlaybackReport> {
    let mut player = headless_player(store, path, None, config)?;
    player.open(path, options)?;
    if let Some(scanner) = scanner {
        player.scan_important_ticks(scanner)?;
    }
    HeadlessRunner::new(player, headless).run()
}

/// Time-demo `path` and append the result row to the CSV file in
/// `results_dir`.
pub fn benchmark(
    store: Box<dyn FileStore>,
    path: &Path,
    stats_label: &str,
    results_dir: &Path,
    environment: &BenchmarkEnvironment,
    config: &DemoConfig,
) -> Result<TimeDemoResults> {
    let mut player = headless_player(store, path, Some(environment.clone()), config)?;
    let options = PlaybackOptions {
        time_demo: true,
        ..Default::default()
    };
    player.open(path, options)?;
    let report = HeadlessRunner::new(player, HeadlessConfig::default()).run()?;

    if let Some(error) = report.error {
        return Err(DemoError::Playback(error));
    }
    let results = report.results.ok_or_else(|| {
        DemoError::Playback(format!(
            "demo ended within the {} tick warmup",
            config.playback.timedemo_warmup_ticks
        ))
    })?;

    let demo_file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let csv = append_results(results_dir, &demo_file, stats_label, &results, environment)?;
    tracing::info!(path = %csv.display(), %results, "Wrote time demo results");
    Ok(results)
}
