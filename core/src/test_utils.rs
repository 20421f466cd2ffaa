//! Shared test utilities for integration and unit tests

use std::path::{Path, PathBuf};

use glam::Vec3;

use crate::error::{DemoError, Result};
use crate::host::{DemoClient, FrameClock, NetworkChannelControl, RecordingSource, SessionInfo};
use crate::replay::binary::DemoWriter;
use crate::replay::scan::{
    BasicNetCodec, EventValue, EventValueKind, ImportantEvent, ImportantEventTable, NetMessage,
    PlayerInfo,
};
use crate::replay::tables::{StringTableSet, USERINFO_TABLE};
use crate::replay::types::{
    CommandInfo, DemoHeader, DemoRecord, PacketData, RecordPayload, SequenceInfo, ViewPose,
};

// ============================================================================
// Scripted host
// ============================================================================

/// Client callback observed by [`FakeHost`]
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Start,
    Stop,
    Restart,
    Disconnect,
    Schema(Vec<u8>),
    StringTables(Vec<u8>),
    Payload { tick: i32, data: Vec<u8> },
    Console(String),
    UserCmd { slot: u8, sequence: i32 },
    CustomData { callback: String, data: Vec<u8> },
    Progress { skipping: bool, tick: i32, play_to: i32 },
    Benchframe(String),
    RecordingStarted(PathBuf),
    RecordingStopped(PathBuf),
}

/// Host fake implementing every capability trait.
///
/// Time only moves when a test changes the public fields.
pub struct FakeHost {
    pub tick_interval: f32,
    pub client_tick: i32,
    pub net_time: f64,
    pub real_time: f64,
    pub max_clients: u32,
    pub sequence: SequenceInfo,
    pub pose: ViewPose,
    pub tables: StringTableSet,
    pub schema: Vec<u8>,
    pub callbacks: Vec<String>,
    pub convars: Vec<String>,
    pub full_updates: u32,
    /// Fail `apply_network_payload` at this tick
    pub reject_payload_at: Option<i32>,
    pub log: Vec<HostEvent>,
    pub views: Vec<(usize, ViewPose)>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            tick_interval: 1.0 / 64.0,
            client_tick: 0,
            net_time: 0.0,
            real_time: 0.0,
            max_clients: 1,
            sequence: SequenceInfo::default(),
            pose: ViewPose::default(),
            tables: StringTableSet::new(),
            schema: vec![0xde, 0xad],
            callbacks: Vec::new(),
            convars: Vec::new(),
            full_updates: 0,
            reject_payload_at: None,
            log: Vec::new(),
            views: Vec::new(),
        }
    }

    /// Ticks of every delivered signon or packet payload, in order
    pub fn payload_ticks(&self) -> Vec<i32> {
        self.log
            .iter()
            .filter_map(|e| match e {
                HostEvent::Payload { tick, .. } => Some(*tick),
                _ => None,
            })
            .collect()
    }
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock for FakeHost {
    fn tick_interval(&self) -> f32 {
        self.tick_interval
    }

    fn client_tick(&self) -> i32 {
        self.client_tick
    }

    fn net_time(&self) -> f64 {
        self.net_time
    }

    fn real_time(&self) -> f64 {
        self.real_time
    }

    fn max_clients(&self) -> u32 {
        self.max_clients
    }
}

impl NetworkChannelControl for FakeHost {
    fn sequence_info(&self) -> SequenceInfo {
        self.sequence
    }

    fn set_sequence_info(&mut self, info: SequenceInfo) {
        self.sequence = info;
    }
}

impl DemoClient for FakeHost {
    fn apply_network_schema(&mut self, data: &[u8]) -> Result<()> {
        self.log.push(HostEvent::Schema(data.to_vec()));
        Ok(())
    }

    fn apply_string_tables(&mut self, data: &[u8]) -> Result<()> {
        self.log.push(HostEvent::StringTables(data.to_vec()));
        Ok(())
    }

    fn apply_network_payload(&mut self, tick: i32, data: &[u8]) -> Result<()> {
        if self.reject_payload_at == Some(tick) {
            return Err(DemoError::Decode(format!("rejected payload at tick {tick}")));
        }
        self.log.push(HostEvent::Payload {
            tick,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn execute_console_command(&mut self, command: &str) {
        self.log.push(HostEvent::Console(command.to_string()));
    }

    fn decode_user_command(&mut self, slot: u8, sequence: i32, _data: &[u8]) -> Result<()> {
        self.log.push(HostEvent::UserCmd { slot, sequence });
        Ok(())
    }

    fn apply_custom_data(&mut self, callback: &str, data: &[u8]) {
        self.log.push(HostEvent::CustomData {
            callback: callback.to_string(),
            data: data.to_vec(),
        });
    }

    fn on_playback_start(&mut self, _header: &DemoHeader) {
        self.log.push(HostEvent::Start);
    }

    fn on_playback_stop(&mut self) {
        self.log.push(HostEvent::Stop);
    }

    fn on_playback_restart(&mut self) {
        self.log.push(HostEvent::Restart);
    }

    fn set_view(&mut self, slot: usize, pose: &ViewPose) {
        self.views.push((slot, *pose));
    }

    fn disconnect(&mut self) {
        self.log.push(HostEvent::Disconnect);
    }

    fn on_highlight_progress(&mut self, skipping: bool, current_tick: i32, play_to_tick: i32) {
        self.log.push(HostEvent::Progress {
            skipping,
            tick: current_tick,
            play_to: play_to_tick,
        });
    }

    fn capture_benchframe(&mut self, name: &str) {
        self.log.push(HostEvent::Benchframe(name.to_string()));
    }
}

impl RecordingSource for FakeHost {
    fn session_info(&self) -> SessionInfo {
        SessionInfo {
            network_protocol: 13,
            server_name: "localhost".to_string(),
            client_name: "tester".to_string(),
            map_name: "de_test".to_string(),
            game_directory: "csgo".to_string(),
        }
    }

    fn view_pose(&self, _slot: usize) -> ViewPose {
        self.pose
    }

    fn encode_user_command(&self, _slot: usize, command_number: i32) -> Option<Vec<u8>> {
        Some(command_number.to_le_bytes().to_vec())
    }

    fn string_table_snapshot(&self) -> StringTableSet {
        self.tables.clone()
    }

    fn network_schema_snapshot(&self) -> Vec<u8> {
        self.schema.clone()
    }

    fn demo_convars(&self) -> Vec<String> {
        self.convars.clone()
    }

    fn custom_data_callbacks(&self) -> Vec<String> {
        self.callbacks.clone()
    }

    fn request_full_update(&mut self) {
        self.full_updates += 1;
    }

    fn on_recording_started(&mut self, path: &Path) {
        self.log.push(HostEvent::RecordingStarted(path.to_path_buf()));
    }

    fn on_recording_stopped(&mut self, path: &Path) {
        self.log.push(HostEvent::RecordingStopped(path.to_path_buf()));
    }
}

// ============================================================================
// Container fixtures
// ============================================================================

/// Xuid of the player credited with every kill in [`write_match`]
pub const SUBJECT_XUID: u64 = 76561198000000001;

/// Codec knowing a single `player_death (userid, attacker)` event
pub fn kill_codec() -> BasicNetCodec {
    let mut codec = BasicNetCodec::new();
    codec.register(
        "player_death",
        &[
            ("userid", EventValueKind::Int),
            ("attacker", EventValueKind::Int),
        ],
    );
    codec
}

pub fn kill_events() -> ImportantEventTable {
    let mut death = ImportantEvent::new("player_death");
    death.user_keys = [
        ("userid".to_string(), "victim".to_string()),
        ("attacker".to_string(), "attacker".to_string()),
    ]
    .into_iter()
    .collect();
    death.seek_time_before = 0.5;
    ImportantEventTable::new(vec![death])
}

/// Packet at `tick` whose slot 0 origin x equals the tick
pub fn numbered_packet(tick: i32) -> DemoRecord {
    let mut info = CommandInfo::default();
    info.slots[0].pose.origin = Vec3::new(tick as f32, 0.0, 0.0);
    DemoRecord::new(
        tick,
        0,
        RecordPayload::Packet(PacketData {
            info,
            sequence: SequenceInfo {
                in_sequence: tick,
                out_sequence_ack: tick,
            },
            data: tick.to_le_bytes().to_vec(),
        }),
    )
}

/// Finalized container of `ticks` packets at 64 ticks per second with the
/// subject (user id 3) killing user 9 at each tick in `kills`
pub fn write_match(dir: &Path, name: &str, ticks: i32, kills: &[i32]) -> PathBuf {
    let codec = kill_codec();
    let file = std::fs::File::create(dir.join(name)).unwrap();
    let mut writer = DemoWriter::create(file, DemoHeader::default()).unwrap();

    let subject = PlayerInfo {
        xuid: SUBJECT_XUID,
        user_id: 3,
        name: "alice".into(),
    };
    let mut tables = StringTableSet::new();
    tables
        .table_mut(USERINFO_TABLE)
        .set("0", subject.encode());

    writer
        .write_record(&DemoRecord::new(0, 0, RecordPayload::Signon(PacketData::default())))
        .unwrap();
    writer
        .write_record(&DemoRecord::new(0, 0, RecordPayload::SyncTick))
        .unwrap();
    writer
        .write_record(&DemoRecord::new(0, 0, RecordPayload::StringTables(tables.encode())))
        .unwrap();
    for tick in 1..=ticks {
        let mut record = numbered_packet(tick);
        if kills.contains(&tick)
            && let RecordPayload::Packet(data) = &mut record.payload
        {
            let kill = codec
                .game_event(
                    "player_death",
                    &[("userid", EventValue::Int(9)), ("attacker", EventValue::Int(3))],
                )
                .unwrap();
            data.data = BasicNetCodec::encode(&[kill]);
        } else if let RecordPayload::Packet(data) = &mut record.payload {
            data.data = BasicNetCodec::encode(&[NetMessage::Other {
                kind: 9,
                data: tick.to_le_bytes().to_vec(),
            }]);
        }
        writer.write_record(&record).unwrap();
    }
    writer
        .write_record(&DemoRecord::new(ticks, 0, RecordPayload::Stop))
        .unwrap();
    writer.update_totals(ticks, ticks as f32 / 64.0, ticks);
    writer.close().unwrap();
    PathBuf::from(name)
}
