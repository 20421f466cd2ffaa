//! Demoreel Core - Demo recording, playback and highlight engine
//!
//! This crate records a client's network traffic into a single container
//! file and plays it back deterministically through the same client.
//!
//! # Architecture
//!
//! - [`replay::Recorder`] - Serializes live traffic into a container
//! - [`replay::Player`] - Drives the client from a container at the pace of the host clock
//! - [`replay::ImportanceScanner`] - Second pass that indexes notable events
//! - [`replay::HighlightComposer`] - Turns the index into watchable segments
//! - [`host`] - Capability traits the engine needs from the game client
//! - [`transport`] - File-level operations for shells and tools

pub mod config;
pub mod error;
pub mod host;
#[cfg(test)]
mod integration;
pub mod replay;
#[cfg(test)]
pub mod test_utils;
pub mod transport;

// Re-export core traits and types
pub use config::DemoConfig;
pub use error::{DemoError, Result};
pub use host::{
    DemoClient, DemoStream, FileStore, FrameClock, NetworkChannelControl, OsFileStore,
    PlaybackHost, RecordingHost, RecordingSource, SessionInfo,
};

// Re-export transport operations
pub use transport::{
    HighlightReport, benchmark, compose_highlights, list_demo, next_incremental_name, play_headless,
    scan_demo,
};
