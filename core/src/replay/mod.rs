//! Demo record and replay
//!
//! A demo is a single container file: a fixed header followed by the
//! buffered signon records and then one record per recorded frame.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Recording Mode                        │
//! │ client frames → Recorder → .dem (header + records)       │
//! └──────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Playback Mode                         │
//! │ .dem → Player → client (payloads, commands, camera)      │
//! │          │                                               │
//! │          └─ clock: timescale, pause, skip, fast-forward  │
//! └──────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Scanning                              │
//! │ .dem → ImportanceScanner → ImportantTickIndex            │
//! │                               │                          │
//! │                               └─ HighlightComposer       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ## Recording
//!
//! ```ignore
//! use demoreel_core::replay::{Recorder, SignonState};
//!
//! let mut recorder = Recorder::new(host, store, config.recording);
//! recorder.start_recording("match", true)?;
//!
//! // Every client frame:
//! recorder.record_messages(&network_bytes);
//! recorder.record_packet();
//!
//! recorder.stop_recording();
//! ```
//!
//! ## Playback
//!
//! ```ignore
//! use demoreel_core::replay::{PlaybackOptions, Player};
//!
//! let mut player = Player::new(host, store, config);
//! player.open(Path::new("match.dem"), PlaybackOptions::default())?;
//!
//! while player.is_playing() {
//!     player.run_frame(frame_time);
//! }
//! ```

pub mod binary;
pub mod runtime;
pub mod scan;
pub mod tables;
pub mod types;

// Re-export core types
pub use types::{
    CommandHeader, CommandInfo, CommandKind, ContainerTotals, DemoHeader, DemoRecord, PacketData,
    RecordPayload, SequenceInfo, SplitCommandInfo, ViewPose, ViewTransition,
};

// Re-export binary format
pub use binary::{DemoReader, DemoWriter};

// Re-export tables
pub use tables::{StringTable, StringTableSet};

// Re-export runtime
pub use runtime::{
    BenchmarkEnvironment, HeadlessClient, HeadlessConfig, HeadlessRunner, PlaybackOptions,
    PlaybackReport, PlaybackState, Player, ReadOutcome, Recorder, RecorderPhase,
    RecordingSummary, SignonState, TimeDemoResults,
};

// Re-export scanning
pub use scan::{
    HighlightComposer, HighlightSegment, ImportanceScanner, ImportantEvent, ImportantEventTable,
    ImportantTickIndex, ScanReport,
};
