//! Headless playback
//!
//! Plays a container without a renderer or game client. [`HeadlessClient`]
//! accepts every payload and only counts what it receives, which is enough
//! to validate a demo in CI or to benchmark the container path itself.

use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;

use super::player::{Player, ReadOutcome};
use super::timedemo::{BenchmarkEnvironment, TimeDemoResults};
use crate::error::{DemoError, Result};
use crate::host::{DemoClient, FrameClock, NetworkChannelControl};
use crate::replay::scan::HighlightSegment;
use crate::replay::types::{DemoHeader, SequenceInfo, ViewPose};

/// Headless runner configuration
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Simulated seconds per frame; ignored by time-demos
    pub frame_time: f32,
    /// Stop after this many frames, 0 for no limit
    pub max_frames: u64,
    /// Maximum execution time in seconds
    pub timeout_secs: u64,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            frame_time: 1.0 / 64.0,
            max_frames: 0,
            timeout_secs: 300,
        }
    }
}

/// What the headless client received
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientCounters {
    pub payloads: u64,
    pub payload_bytes: u64,
    pub schemas: u32,
    pub string_tables: u32,
    pub console_commands: Vec<String>,
    pub user_commands: u64,
    pub custom_data: u64,
    pub restarts: u32,
    pub disconnects: u32,
    pub last_payload_tick: i32,
    /// Last camera origin handed to slot 0
    pub last_view_origin: Option<[f32; 3]>,
    pub benchframes: Vec<String>,
}

/// Client without a game behind it.
///
/// Wall-clock time comes from an [`Instant`] taken at construction, so
/// pause auto-resume and time-demo timing behave as they would in a client.
pub struct HeadlessClient {
    tick_interval: f32,
    client_tick: i32,
    started: Instant,
    sequence: SequenceInfo,
    environment: BenchmarkEnvironment,
    counters: ClientCounters,
}

impl HeadlessClient {
    pub fn new(tick_interval: f32) -> Self {
        Self {
            tick_interval,
            client_tick: 0,
            started: Instant::now(),
            sequence: SequenceInfo::default(),
            environment: BenchmarkEnvironment {
                renderer: "headless".to_string(),
                ..Default::default()
            },
            counters: ClientCounters::default(),
        }
    }

    /// Describe the machine in time-demo results
    pub fn with_environment(mut self, environment: BenchmarkEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn counters(&self) -> &ClientCounters {
        &self.counters
    }

    pub fn take_counters(&mut self) -> ClientCounters {
        std::mem::take(&mut self.counters)
    }
}

impl FrameClock for HeadlessClient {
    fn tick_interval(&self) -> f32 {
        self.tick_interval
    }

    fn client_tick(&self) -> i32 {
        self.client_tick
    }

    fn net_time(&self) -> f64 {
        f64::from(self.client_tick) * f64::from(self.tick_interval)
    }

    fn real_time(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

impl NetworkChannelControl for HeadlessClient {
    fn sequence_info(&self) -> SequenceInfo {
        self.sequence
    }

    fn set_sequence_info(&mut self, info: SequenceInfo) {
        self.sequence = info;
    }
}

impl DemoClient for HeadlessClient {
    fn apply_network_schema(&mut self, _data: &[u8]) -> Result<()> {
        self.counters.schemas += 1;
        Ok(())
    }

    fn apply_string_tables(&mut self, _data: &[u8]) -> Result<()> {
        self.counters.string_tables += 1;
        Ok(())
    }

    fn apply_network_payload(&mut self, tick: i32, data: &[u8]) -> Result<()> {
        self.counters.payloads += 1;
        self.counters.payload_bytes += data.len() as u64;
        self.counters.last_payload_tick = tick;
        self.client_tick = tick;
        Ok(())
    }

    fn execute_console_command(&mut self, command: &str) {
        self.counters.console_commands.push(command.to_string());
    }

    fn decode_user_command(&mut self, _slot: u8, _sequence: i32, _data: &[u8]) -> Result<()> {
        self.counters.user_commands += 1;
        Ok(())
    }

    fn apply_custom_data(&mut self, _callback: &str, _data: &[u8]) {
        self.counters.custom_data += 1;
    }

    fn on_playback_start(&mut self, header: &DemoHeader) {
        if let Some(interval) = header.tick_interval() {
            self.tick_interval = interval;
        }
        self.client_tick = 0;
    }

    fn on_playback_restart(&mut self) {
        self.counters.restarts += 1;
    }

    fn set_view(&mut self, slot: usize, pose: &ViewPose) {
        if slot == 0 {
            self.counters.last_view_origin = Some(pose.origin.to_array());
        }
    }

    fn disconnect(&mut self) {
        self.counters.disconnects += 1;
    }

    fn capture_benchframe(&mut self, name: &str) {
        self.counters.benchframes.push(name.to_string());
    }

    fn benchmark_environment(&self) -> BenchmarkEnvironment {
        self.environment.clone()
    }
}

/// Outcome of one headless run
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackReport {
    pub demo: Option<PathBuf>,
    pub header: Option<DemoHeader>,
    /// Header totals were reconstructed from the records
    pub healed: bool,
    /// Non-fatal problem found while opening, e.g. an unhealed header
    pub warning: Option<String>,
    pub frames: u64,
    pub packets: u64,
    pub final_tick: i32,
    /// Playback reached a stop record
    pub completed: bool,
    pub highlights: Vec<HighlightSegment>,
    pub client: ClientCounters,
    pub results: Option<TimeDemoResults>,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
    pub executed_at: Option<String>,
}

/// Drives a [`Player`] frame by frame until playback ends
pub struct HeadlessRunner {
    player: Player<HeadlessClient>,
    config: HeadlessConfig,
    start_time: Option<Instant>,
}

impl HeadlessRunner {
    pub fn new(player: Player<HeadlessClient>, config: HeadlessConfig) -> Self {
        Self {
            player,
            config,
            start_time: None,
        }
    }

    /// Run the opened demo to its end.
    ///
    /// Fails with [`DemoError::NotPlaying`] when nothing is open. Playback
    /// errors end the run and are reported, not returned.
    pub fn run(&mut self) -> Result<PlaybackReport> {
        if !self.player.is_playing() {
            return Err(DemoError::NotPlaying);
        }
        self.start_time = Some(Instant::now());

        let mut report = PlaybackReport {
            demo: self.player.path().map(|p| p.to_path_buf()),
            header: self.player.header().cloned(),
            healed: self.player.healed(),
            warning: self.player.warning().map(ToString::to_string),
            frames: 0,
            packets: 0,
            final_tick: 0,
            completed: false,
            highlights: self.player.highlights().to_vec(),
            client: ClientCounters::default(),
            results: None,
            error: None,
            duration_ms: None,
            executed_at: None,
        };

        while self.player.is_playing() {
            if let Some(start) = self.start_time
                && start.elapsed().as_secs() > self.config.timeout_secs
            {
                report.error = Some("Execution timeout exceeded".to_string());
                report.results = self.player.stop_playback();
                break;
            }
            if self.config.max_frames > 0 && report.frames >= self.config.max_frames {
                tracing::info!(frames = report.frames, "Headless frame limit reached");
                report.results = self.player.stop_playback();
                break;
            }

            report.final_tick = self.player.playback_tick();
            match self.player.run_frame(self.config.frame_time) {
                ReadOutcome::Finished => report.completed = true,
                ReadOutcome::Closed if report.error.is_none() => {
                    if let Some(err) = self.player.last_error() {
                        report.error = Some(err.to_string());
                    }
                }
                _ => {}
            }
            report.frames += 1;
        }

        if report.results.is_none() {
            report.results = self.player.take_results();
        }
        report.client = self.player.host_mut().take_counters();
        report.packets = report.client.payloads;
        report.final_tick = report.final_tick.max(report.client.last_payload_tick);

        if let Some(start) = self.start_time {
            report.duration_ms = Some(start.elapsed().as_millis() as u64);
            report.executed_at = Some(chrono::Utc::now().to_rfc3339());
        }

        tracing::info!(
            frames = report.frames,
            packets = report.packets,
            completed = report.completed,
            "Headless playback finished"
        );
        Ok(report)
    }

    pub fn player(&self) -> &Player<HeadlessClient> {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut Player<HeadlessClient> {
        &mut self.player
    }

    pub fn into_player(self) -> Player<HeadlessClient> {
        self.player
    }
}
