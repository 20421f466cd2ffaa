//! Configuration management (demoreel.toml)
//!
//! Handles loading, saving, and providing defaults for recording, playback,
//! highlight and validation settings. Settings are stored in TOML format in
//! the platform-specific config directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DemoError, Result};
use crate::replay::runtime::InterpolationLimits;

const CONFIG_FILE: &str = "demoreel.toml";

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DemoConfig {
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub highlights: HighlightConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Recorder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Whether recording may be started at all (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Append locally typed console commands to the demo (default: true)
    #[serde(default = "default_true")]
    pub record_commands: bool,
    /// Write a string-table snapshot every N ticks, 0 disables (default: 0)
    #[serde(default)]
    pub snapshot_interval_ticks: u32,
    /// Rewrite the header trailer every N frames, 0 only at close (default: 0)
    #[serde(default)]
    pub flush_interval_frames: u32,
    /// Temporary file used to buffer signon data
    #[serde(default = "default_signon_buffer")]
    pub signon_buffer_name: String,
}

/// Player settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Blend the camera between packets (default: true)
    #[serde(default = "default_true")]
    pub interpolate_view: bool,
    /// Origin velocity treated as a teleport, units/s (default: 4000)
    #[serde(default = "default_interp_limit")]
    pub interp_limit: f32,
    /// Angular velocity treated as a teleport, degrees/s (default: 2000)
    #[serde(default = "default_avel_limit")]
    pub avel_limit: f32,
    #[serde(default = "default_ff_start")]
    pub fast_forward_start_speed: f32,
    #[serde(default = "default_ff_final")]
    pub fast_forward_final_speed: f32,
    /// Seconds to ramp from start to final speed (default: 5)
    #[serde(default = "default_ff_ramp")]
    pub fast_forward_ramp_time: f32,
    /// Look-ahead window for interpolation samples, in ticks (default: 8)
    #[serde(default = "default_parse_ahead")]
    pub parse_ahead_ticks: i32,
    /// Ticks played before time-demo timing starts (default: 100)
    #[serde(default = "default_warmup")]
    pub timedemo_warmup_ticks: i32,
    #[serde(default = "default_max_timescale")]
    pub max_timescale: f32,
    /// Tick interval assumed when no host clock is available (default: 1/64)
    #[serde(default = "default_tick_interval")]
    pub headless_tick_interval: f32,
}

/// Highlight reel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightConfig {
    /// Seconds shown before each event (default: 6)
    #[serde(default = "default_time_before")]
    pub time_before: f32,
    /// Seconds shown after each event (default: 4)
    #[serde(default = "default_time_after")]
    pub time_after: f32,
    #[serde(default = "default_highlight_ff")]
    pub fast_forward_speed: f32,
    /// Event marking the end of a match; a final segment seeks to it
    #[serde(default)]
    pub end_marker_event: Option<String>,
    #[serde(default = "default_end_lead")]
    pub end_marker_lead_seconds: f32,
}

/// Container validation settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Never heal incomplete headers (default: false)
    #[serde(default)]
    pub strict: bool,
}

fn default_true() -> bool {
    true
}
fn default_signon_buffer() -> String {
    "demoheader.tmp".to_string()
}
fn default_interp_limit() -> f32 {
    4000.0
}
fn default_avel_limit() -> f32 {
    2000.0
}
fn default_ff_start() -> f32 {
    2.0
}
fn default_ff_final() -> f32 {
    20.0
}
fn default_ff_ramp() -> f32 {
    5.0
}
fn default_parse_ahead() -> i32 {
    8
}
fn default_warmup() -> i32 {
    100
}
fn default_max_timescale() -> f32 {
    100.0
}
fn default_tick_interval() -> f32 {
    1.0 / 64.0
}
fn default_time_before() -> f32 {
    6.0
}
fn default_time_after() -> f32 {
    4.0
}
fn default_highlight_ff() -> f32 {
    10.0
}
fn default_end_lead() -> f32 {
    1.0
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            record_commands: default_true(),
            snapshot_interval_ticks: 0,
            flush_interval_frames: 0,
            signon_buffer_name: default_signon_buffer(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            interpolate_view: default_true(),
            interp_limit: default_interp_limit(),
            avel_limit: default_avel_limit(),
            fast_forward_start_speed: default_ff_start(),
            fast_forward_final_speed: default_ff_final(),
            fast_forward_ramp_time: default_ff_ramp(),
            parse_ahead_ticks: default_parse_ahead(),
            timedemo_warmup_ticks: default_warmup(),
            max_timescale: default_max_timescale(),
            headless_tick_interval: default_tick_interval(),
        }
    }
}

impl PlaybackConfig {
    pub fn interpolation_limits(&self) -> InterpolationLimits {
        InterpolationLimits {
            max_velocity: self.interp_limit,
            max_angular_velocity: self.avel_limit,
        }
    }
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            time_before: default_time_before(),
            time_after: default_time_after(),
            fast_forward_speed: default_highlight_ff(),
            end_marker_event: None,
            end_marker_lead_seconds: default_end_lead(),
        }
    }
}

/// Returns the platform-specific configuration directory.
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.demoreel", "", "DemoReel")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Loads the configuration from disk.
///
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> DemoConfig {
    config_dir()
        .and_then(|dir| load_from(&dir.join(CONFIG_FILE)).ok())
        .unwrap_or_default()
}

/// Loads the configuration from an explicit path, reporting failures.
pub fn load_from(path: &Path) -> Result<DemoConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| DemoError::Config(format!("{}: {e}", path.display())))
}

/// Saves the configuration to the platform config directory.
pub fn save(config: &DemoConfig) -> Result<()> {
    if let Some(dir) = config_dir() {
        save_to(config, &dir.join(CONFIG_FILE))?;
    }
    Ok(())
}

pub fn save_to(config: &DemoConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| DemoError::Config(e.to_string()))?;
    std::fs::write(path, content)?;
    Ok(())
}
