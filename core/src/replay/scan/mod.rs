//! Importance scanning and highlight reels
//!
//! A scan is a read-only second pass over a container. It indexes events
//! named in an [`ImportantEventTable`] and can aggregate statistics for one
//! event pattern. [`HighlightComposer`] turns the index into playback ranges
//! for one subject.

pub mod events;
pub mod highlights;
pub mod roster;
pub mod scanner;
pub mod wire;

pub use events::{
    EventDescriptor, EventKeyDef, EventKeys, EventSource, EventValue, EventValueKind,
    ImportantEvent, ImportantEventTable,
};
pub use highlights::{HighlightComposer, HighlightSegment, describe_segments};
pub use roster::{PlayerInfo, Roster};
pub use scanner::{
    ImportanceScanner, ImportantTick, ImportantTickIndex, PatternStats, ScanReport,
};
pub use wire::{BasicNetCodec, MessageDecoder, NetMessage, NetMessages};
