//! Replay runtime
//!
//! This module contains the frame-driven halves of the engine:
//! - **Recorder**: Captures a live session into a container
//! - **Player**: Plays a container back through the host client
//! - **Clock**: Playback tick, timescale, pause and skip bookkeeping
//! - **Interp**: Camera blending between packets
//! - **Timedemo**: Benchmark statistics and CSV results
//! - **Headless**: Playback without a game client, for CI and benchmarks

mod clock;
mod headless;
mod interp;
mod player;
mod recorder;
mod timedemo;

pub use clock::{FastForwardRamp, PlaybackClock};
pub use headless::{
    ClientCounters, HeadlessClient, HeadlessConfig, HeadlessRunner, PlaybackReport,
};
pub use interp::{InterpolationLimits, ViewInterpolator, ViewSample};
pub use player::{
    HighlightRequest, PlaybackOptions, PlaybackState, Player, ReadOutcome, parse_goto_target,
};
pub use recorder::{
    Recorder, RecorderPhase, RecordingSummary, SignonState, demo_file_name, next_incremental_name,
};
pub use timedemo::{
    BenchmarkEnvironment, TimeDemoResults, TimeDemoStats, append_results, prettify_gpu_name,
    results_file_name,
};
