//! Core types for the demo container
//!
//! These structures are shared by the recorder, the player and the scanner.
//! Their byte layout lives in [`crate::replay::binary`].

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Magic stamp at the start of every container
pub const DEMO_HEADER_STAMP: [u8; 8] = *b"REELDEM\0";
/// Container protocol written by this build
pub const DEMO_PROTOCOL: i32 = 4;
/// Oldest container protocol this build can read
pub const OLDEST_DEMO_PROTOCOL: i32 = 3;
/// Width of each fixed name field in the header
pub const MAX_OSPATH: usize = 260;
/// Total header size in bytes
pub const HEADER_SIZE: u64 = 8 + 4 + 4 + 4 * MAX_OSPATH as u64 + 4 + 4 + 4 + 4;
/// Size of a record header (kind, tick, slot)
pub const RECORD_HEADER_SIZE: u64 = 1 + 4 + 1;
/// Number of view slots carried by every packet record
pub const MAX_SPLITSCREEN_CLIENTS: usize = 2;
/// Encoded size of one slot of [`CommandInfo`]
pub const SPLIT_COMMAND_INFO_SIZE: u64 = 4 + 3 * 3 * 4;
/// Encoded size of [`CommandInfo`]
pub const COMMAND_INFO_SIZE: u64 = SPLIT_COMMAND_INFO_SIZE * MAX_SPLITSCREEN_CLIENTS as u64;
/// Encoded size of [`SequenceInfo`]
pub const SEQUENCE_INFO_SIZE: u64 = 8;
/// Largest payload a single record may declare
pub const MAX_PAYLOAD_SIZE: usize = 2 * 1024 * 1024;
/// Custom-data callback index reserved for the callback name table
pub const CUSTOM_DATA_TABLE_INDEX: i32 = -1;

/// Record kinds stored in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandKind {
    /// Buffered handshake payload
    Signon = 1,
    /// One frame of network payload
    Packet = 2,
    /// Re-anchor the playback clock
    SyncTick = 3,
    ConsoleCmd = 4,
    UserCmd = 5,
    /// Network schema snapshot
    DataTables = 6,
    /// End of demo
    Stop = 7,
    /// Opaque blob for a named callback
    CustomData = 8,
    /// String table snapshot
    StringTables = 9,
}

impl CommandKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Signon,
            2 => Self::Packet,
            3 => Self::SyncTick,
            4 => Self::ConsoleCmd,
            5 => Self::UserCmd,
            6 => Self::DataTables,
            7 => Self::Stop,
            8 => Self::CustomData,
            9 => Self::StringTables,
            _ => return None,
        })
    }

    /// Control records are applied as soon as they are read, ignoring the clock.
    pub fn is_control(self) -> bool {
        matches!(
            self,
            Self::Signon | Self::Stop | Self::SyncTick | Self::DataTables | Self::StringTables
        )
    }

    /// Signon and packet records carry Command-Info and sequence numbers.
    pub fn carries_command_info(self) -> bool {
        matches!(self, Self::Signon | Self::Packet)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Signon => "signon",
            Self::Packet => "packet",
            Self::SyncTick => "synctick",
            Self::ConsoleCmd => "consolecmd",
            Self::UserCmd => "usercmd",
            Self::DataTables => "datatables",
            Self::Stop => "stop",
            Self::CustomData => "customdata",
            Self::StringTables => "stringtables",
        }
    }
}

/// Whether a camera sample continues from the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ViewTransition {
    /// Safe to blend from the previous sample
    #[default]
    Continuous,
    /// Camera teleported; never blend into this sample
    Discontinuous,
}

impl ViewTransition {
    pub fn to_u32(self) -> u32 {
        match self {
            Self::Continuous => 0,
            Self::Discontinuous => 1,
        }
    }

    /// Any non-zero value is treated as a discontinuity.
    pub fn from_u32(value: u32) -> Self {
        if value == 0 {
            Self::Continuous
        } else {
            Self::Discontinuous
        }
    }
}

/// Camera pose. Angles are pitch, yaw, roll in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewPose {
    pub origin: Vec3,
    pub angles: Vec3,
    pub local_angles: Vec3,
}

/// Command-Info for a single view slot
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SplitCommandInfo {
    pub transition: ViewTransition,
    pub pose: ViewPose,
}

/// Per-record camera snapshot for every view slot
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommandInfo {
    pub slots: [SplitCommandInfo; MAX_SPLITSCREEN_CLIENTS],
}

impl CommandInfo {
    pub fn slot(&self, slot: usize) -> &SplitCommandInfo {
        &self.slots[slot.min(MAX_SPLITSCREEN_CLIENTS - 1)]
    }

    pub fn slot_mut(&mut self, slot: usize) -> &mut SplitCommandInfo {
        &mut self.slots[slot.min(MAX_SPLITSCREEN_CLIENTS - 1)]
    }
}

/// Network channel sequence numbers stored with each packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequenceInfo {
    pub in_sequence: i32,
    pub out_sequence_ack: i32,
}

/// Header preceding every record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub kind: CommandKind,
    pub tick: i32,
    pub slot: u8,
}

/// Payload of a signon or packet record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PacketData {
    pub info: CommandInfo,
    pub sequence: SequenceInfo,
    pub data: Vec<u8>,
}

/// Decoded payload of one record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPayload {
    Signon(PacketData),
    Packet(PacketData),
    SyncTick,
    Stop,
    ConsoleCmd(String),
    UserCmd { sequence: i32, data: Vec<u8> },
    DataTables(Vec<u8>),
    StringTables(Vec<u8>),
    CustomData { callback: i32, data: Vec<u8> },
}

impl RecordPayload {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Signon(_) => CommandKind::Signon,
            Self::Packet(_) => CommandKind::Packet,
            Self::SyncTick => CommandKind::SyncTick,
            Self::Stop => CommandKind::Stop,
            Self::ConsoleCmd(_) => CommandKind::ConsoleCmd,
            Self::UserCmd { .. } => CommandKind::UserCmd,
            Self::DataTables(_) => CommandKind::DataTables,
            Self::StringTables(_) => CommandKind::StringTables,
            Self::CustomData { .. } => CommandKind::CustomData,
        }
    }
}

/// One complete record: header fields plus payload
#[derive(Debug, Clone, PartialEq)]
pub struct DemoRecord {
    pub tick: i32,
    pub slot: u8,
    pub payload: RecordPayload,
}

impl DemoRecord {
    pub fn new(tick: i32, slot: u8, payload: RecordPayload) -> Self {
        Self {
            tick,
            slot,
            payload,
        }
    }

    pub fn header(&self) -> CommandHeader {
        CommandHeader {
            kind: self.payload.kind(),
            tick: self.tick,
            slot: self.slot,
        }
    }
}

/// Fixed-size header at the start of the container.
///
/// The trailer fields (`playback_time`, `playback_ticks`, `playback_frames`)
/// are provisional while recording and only authoritative after a clean close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoHeader {
    pub demo_protocol: i32,
    pub network_protocol: i32,
    pub server_name: String,
    pub client_name: String,
    pub map_name: String,
    pub game_directory: String,
    /// Seconds of playback
    pub playback_time: f32,
    pub playback_ticks: i32,
    pub playback_frames: i32,
    /// Bytes of buffered signon data following the header
    pub signon_length: i32,
}

impl Default for DemoHeader {
    fn default() -> Self {
        Self {
            demo_protocol: DEMO_PROTOCOL,
            network_protocol: 0,
            server_name: String::new(),
            client_name: String::new(),
            map_name: String::new(),
            game_directory: String::new(),
            playback_time: 0.0,
            playback_ticks: 0,
            playback_frames: 0,
            signon_length: 0,
        }
    }
}

impl DemoHeader {
    /// Trailer was never rewritten by a clean close.
    pub fn is_incomplete(&self) -> bool {
        self.playback_ticks == 0 && self.playback_frames == 0 && self.playback_time == 0.0
    }

    /// Seconds per tick implied by the trailer, if it is usable.
    pub fn tick_interval(&self) -> Option<f32> {
        (self.playback_ticks > 0 && self.playback_time > 0.0)
            .then(|| self.playback_time / self.playback_ticks as f32)
    }

    /// Overwrite the trailer with observed totals.
    pub fn set_totals(&mut self, ticks: i32, frames: i32, tick_interval: f32) {
        self.playback_ticks = ticks;
        self.playback_frames = frames;
        self.playback_time = ticks as f32 * tick_interval;
    }
}

/// Totals observed by walking every record of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ContainerTotals {
    /// Highest tick on any packet record
    pub highest_tick: i32,
    /// Number of packet records
    pub packets: i32,
    /// Number of records of any kind
    pub records: u32,
    /// The walk stopped on a truncated or malformed record
    pub truncated: bool,
}

impl ContainerTotals {
    /// Whether these totals are enough to rewrite an incomplete header.
    ///
    /// Both playback and scanning use this rule so a demo heals the same way
    /// regardless of which path opened it.
    pub fn can_heal(&self) -> bool {
        self.packets > 0 && self.highest_tick > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(HEADER_SIZE, 1072);
        assert_eq!(COMMAND_INFO_SIZE, 80);
    }

    #[test]
    fn test_command_kind_codes() {
        for code in 1..=9u8 {
            let kind = CommandKind::from_u8(code).unwrap();
            assert_eq!(kind as u8, code);
        }
        assert_eq!(CommandKind::from_u8(0), None);
        assert_eq!(CommandKind::from_u8(10), None);
    }

    #[test]
    fn test_control_kinds() {
        assert!(CommandKind::SyncTick.is_control());
        assert!(CommandKind::StringTables.is_control());
        assert!(!CommandKind::Packet.is_control());
        assert!(!CommandKind::ConsoleCmd.is_control());
        assert!(!CommandKind::UserCmd.is_control());
    }

    #[test]
    fn test_transition_decoding() {
        assert_eq!(ViewTransition::from_u32(0), ViewTransition::Continuous);
        assert_eq!(ViewTransition::from_u32(1), ViewTransition::Discontinuous);
        assert_eq!(ViewTransition::from_u32(7), ViewTransition::Discontinuous);
    }

    #[test]
    fn test_header_incomplete() {
        let mut header = DemoHeader::default();
        assert!(header.is_incomplete());
        assert_eq!(header.tick_interval(), None);

        header.set_totals(128, 120, 1.0 / 64.0);
        assert!(!header.is_incomplete());
        assert_eq!(header.playback_time, 2.0);
        assert_eq!(header.tick_interval(), Some(1.0 / 64.0));
    }

    #[test]
    fn test_can_heal() {
        assert!(!ContainerTotals::default().can_heal());

        let single = ContainerTotals {
            highest_tick: 1,
            packets: 1,
            ..Default::default()
        };
        assert!(single.can_heal());

        let tickless = ContainerTotals {
            highest_tick: 0,
            packets: 3,
            ..Default::default()
        };
        assert!(!tickless.can_heal());
    }
}
