//! Time-demo benchmarking
//!
//! Measures playback throughput once the warmup period has passed and appends
//! one row per run to a CSV results file.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{DemoError, Result};

/// Renderer and machine description written alongside each result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BenchmarkEnvironment {
    pub host_name: String,
    pub renderer: String,
    pub driver_name: String,
    pub vendor_id: u32,
    pub device_id: u32,
    pub width: u32,
    pub height: u32,
    pub msaa: u32,
    pub aniso: u32,
    pub backbuffer_format: String,
    pub command_line: String,
    pub sound_enabled: bool,
    pub vsync: bool,
    pub gpu_level: i32,
    pub cpu_level: i32,
}

/// Final numbers of one time-demo run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeDemoResults {
    pub frames: u32,
    pub seconds: f64,
    pub fps: f64,
    pub ms_per_frame: f64,
    pub fps_variability: f64,
}

impl std::fmt::Display for TimeDemoResults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames {:5.3} seconds {:5.2} fps ({:5.2} ms/f) {:5.3} fps variability",
            self.frames, self.seconds, self.fps, self.ms_per_frame, self.fps_variability
        )
    }
}

/// Frame timing accumulated during a time-demo
#[derive(Debug, Clone)]
pub struct TimeDemoStats {
    warmup_ticks: i32,
    start_time: Option<f64>,
    last_time: f64,
    frames: u32,
    total_variability: f64,
}

impl TimeDemoStats {
    pub fn new(warmup_ticks: i32) -> Self {
        Self {
            warmup_ticks,
            start_time: None,
            last_time: 0.0,
            frames: 0,
            total_variability: 0.0,
        }
    }

    pub fn is_timing(&self) -> bool {
        self.start_time.is_some()
    }

    /// Record one rendered frame at wall time `now`.
    ///
    /// Timing starts on the first frame whose playback tick is past the warmup.
    /// Variability is the distance of the instantaneous frame rate from the
    /// running average.
    pub fn mark_frame(&mut self, playback_tick: i32, now: f64) {
        let Some(start) = self.start_time else {
            if playback_tick > self.warmup_ticks {
                self.start_time = Some(now);
                self.last_time = now;
            }
            return;
        };

        self.frames += 1;
        let dt = now - self.last_time;
        let elapsed = now - start;
        if dt > 0.0 && elapsed > 0.0 {
            let current_fps = 1.0 / dt;
            let average_fps = self.frames as f64 / elapsed;
            self.total_variability += (current_fps - average_fps).abs();
        }
        self.last_time = now;
    }

    /// Results so far, or `None` if timing never started
    pub fn results(&self, now: f64) -> Option<TimeDemoResults> {
        let start = self.start_time?;
        let frames = self.frames.saturating_sub(1).max(1);
        let seconds = (now - start).max(1.0);
        Some(TimeDemoResults {
            frames,
            seconds,
            fps: frames as f64 / seconds,
            ms_per_frame: 1000.0 * seconds / frames as f64,
            fps_variability: self.total_variability / frames as f64,
        })
    }
}

const CSV_HEADER: [&str; 22] = [
    "demofile",
    "stats label",
    "fps",
    "fps variability",
    "total sec",
    "avg ms",
    "width",
    "height",
    "msaa",
    "aniso",
    "numframes",
    "renderer",
    "backbuffer",
    "cmdline",
    "driver",
    "vendor id",
    "device id",
    "sound",
    "vsync",
    "gpu_level",
    "cpu_level",
    "date",
];

/// Drop vendor words and replace non-alphanumerics so the name is file-safe
pub fn prettify_gpu_name(driver: &str) -> String {
    let mut name = driver.to_string();
    let lower = driver.to_ascii_lowercase();
    for vendor in ["nvidia", "ati"] {
        if let Some(at) = lower.find(vendor) {
            let mut tail = at + vendor.len();
            if driver[tail..].starts_with(' ') {
                tail += 1;
            }
            name = format!("{}{}", &driver[..at], &driver[tail..]);
            break;
        }
    }
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// `DemoBench_<gpu>_<host>.csv` inside `dir`
pub fn results_file_name(dir: &Path, env: &BenchmarkEnvironment, date: &str) -> PathBuf {
    let host = if env.host_name.is_empty() {
        date
    } else {
        env.host_name.as_str()
    };
    dir.join(format!(
        "DemoBench_{}_{}.csv",
        prettify_gpu_name(&env.driver_name),
        host
    ))
}

/// Append one result row, writing the column header when the file is new.
///
/// Returns the path that was written.
pub fn append_results(
    dir: &Path,
    demo_file: &str,
    stats_label: &str,
    results: &TimeDemoResults,
    env: &BenchmarkEnvironment,
) -> Result<PathBuf> {
    let date = chrono::Local::now().format("%Y_%m_%d__%H_%M_%S").to_string();
    let path = results_file_name(dir, env, &date);

    std::fs::create_dir_all(dir)?;
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let is_empty = file.metadata()?.len() == 0;

    let mut writer = csv::Writer::from_writer(file);
    let csv_err = |e: csv::Error| DemoError::Io(std::io::Error::other(e));
    if is_empty {
        writer.write_record(CSV_HEADER).map_err(csv_err)?;
    }
    writer
        .write_record([
            demo_file.to_string(),
            stats_label.to_string(),
            format!("{:.1}", results.fps),
            format!("{:.1}", results.fps_variability),
            format!("{:.1}", results.seconds),
            format!("{:.3}", results.ms_per_frame),
            env.width.to_string(),
            env.height.to_string(),
            env.msaa.max(1).to_string(),
            env.aniso.to_string(),
            results.frames.to_string(),
            env.renderer.clone(),
            env.backbuffer_format.clone(),
            env.command_line.clone(),
            env.driver_name.clone(),
            format!("0x{:x}", env.vendor_id),
            format!("0x{:x}", env.device_id),
            if env.sound_enabled { "enabled" } else { "disabled" }.to_string(),
            if env.vsync { "enabled" } else { "disabled" }.to_string(),
            env.gpu_level.to_string(),
            env.cpu_level.to_string(),
            date,
        ])
        .map_err(csv_err)?;
    writer.flush()?;

    tracing::info!(path = %path.display(), fps = results.fps, "Time-demo results written");
    Ok(path)
}
