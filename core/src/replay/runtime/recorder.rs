//! Demo recorder
//!
//! Captures the live session into a container. Signon traffic is buffered in
//! a headless scratch container until the client is fully connected; the real
//! file then starts with a copy of that prefix followed by per-frame packets.

use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::RecordingConfig;
use crate::error::{DemoError, Result};
use crate::host::{DemoStream, FileStore, RecordingHost};
use crate::replay::binary::DemoWriter;
use crate::replay::tables::encode_callback_table;
use crate::replay::types::{
    CUSTOM_DATA_TABLE_INDEX, CommandInfo, DemoHeader, DemoRecord, MAX_SPLITSCREEN_CLIENTS,
    PacketData, RecordPayload, ViewTransition,
};

const DEMO_EXTENSION: &str = "dem";
const MAX_INCREMENTAL_DEMOS: u32 = 1000;

/// Connection milestones reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignonState {
    /// A new connection handshake began
    New,
    /// The client spawned; the signon buffer closes after the current packet
    Spawn,
    /// Fully connected
    Full,
}

/// Where the recorder currently writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecorderPhase {
    Idle,
    BufferingSignon,
    Recording,
}

/// Totals of a finished recording
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub ticks: i32,
    pub time: f32,
    pub frames: i32,
}

struct OpenDemo {
    writer: DemoWriter<Box<dyn DemoStream>>,
    path: PathBuf,
}

/// Records the session of `H` into containers created through a [`FileStore`]
pub struct Recorder<H: RecordingHost> {
    host: H,
    store: Box<dyn FileStore>,
    config: RecordingConfig,
    /// Set while a recording is requested
    base_name: Option<String>,
    demo_number: u32,
    signon: Option<DemoWriter<Box<dyn DemoStream>>>,
    demo: Option<OpenDemo>,
    close_signon_after_packet: bool,
    message_data: Vec<u8>,
    queued: Vec<DemoRecord>,
    start_tick: i32,
    frame_count: i32,
    reset_interpolation: bool,
    last_snapshot_tick: i32,
    last_summary: Option<RecordingSummary>,
    last_error: Option<DemoError>,
}

/// File name of demo `number` for `base`; the first demo has no suffix
pub fn demo_file_name(base: &str, number: u32) -> PathBuf {
    if number <= 1 {
        PathBuf::from(format!("{base}.{DEMO_EXTENSION}"))
    } else {
        PathBuf::from(format!("{base}_{number}.{DEMO_EXTENSION}"))
    }
}

/// First free `base000` .. `base999` name in `store`
pub fn next_incremental_name(store: &dyn FileStore, base: &str) -> Option<String> {
    (0..MAX_INCREMENTAL_DEMOS)
        .map(|n| format!("{base}{n:03}"))
        .find(|candidate| !store.exists(&demo_file_name(candidate, 1)))
}

fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.contains("..") {
        return Err(DemoError::InvalidName(name.to_string()));
    }
    let suffix = format!(".{DEMO_EXTENSION}");
    let split = trimmed
        .len()
        .checked_sub(suffix.len())
        .and_then(|at| Some((at, trimmed.get(at..)?)));
    let base = match split {
        Some((at, tail)) if tail.eq_ignore_ascii_case(&suffix) => &trimmed[..at],
        _ => trimmed,
    };
    if base.is_empty() {
        return Err(DemoError::InvalidName(name.to_string()));
    }
    Ok(base.to_string())
}

impl<H: RecordingHost> Recorder<H> {
    pub fn new(host: H, store: Box<dyn FileStore>, config: RecordingConfig) -> Self {
        Self {
            host,
            store,
            config,
            base_name: None,
            demo_number: 0,
            signon: None,
            demo: None,
            close_signon_after_packet: false,
            message_data: Vec::new(),
            queued: Vec::new(),
            start_tick: 0,
            frame_count: 0,
            reset_interpolation: false,
            last_snapshot_tick: 0,
            last_summary: None,
            last_error: None,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Whether a recording has been requested and not stopped
    pub fn is_recording(&self) -> bool {
        self.base_name.is_some()
    }

    pub fn phase(&self) -> RecorderPhase {
        if self.demo.is_some() {
            RecorderPhase::Recording
        } else if self.signon.is_some() {
            RecorderPhase::BufferingSignon
        } else {
            RecorderPhase::Idle
        }
    }

    /// Path of the container currently being written
    pub fn demo_path(&self) -> Option<&Path> {
        self.demo.as_ref().map(|d| d.path.as_path())
    }

    pub fn frame_count(&self) -> i32 {
        self.frame_count
    }

    pub fn last_error(&self) -> Option<&DemoError> {
        self.last_error.as_ref()
    }

    pub fn last_summary(&self) -> Option<&RecordingSummary> {
        self.last_summary.as_ref()
    }

    fn time_to_ticks(&self, seconds: f64) -> i32 {
        let interval = self.host.tick_interval() as f64;
        if interval <= 0.0 {
            return 0;
        }
        (0.5 + seconds / interval) as i32
    }

    fn host_tick(&self) -> i32 {
        if self.host.max_clients() > 1 {
            self.time_to_ticks(self.host.net_time())
        } else {
            self.host.client_tick()
        }
    }

    /// Current tick relative to the start of the recording
    pub fn recording_tick(&self) -> i32 {
        self.host_tick() - self.start_tick
    }

    fn resync_clock(&mut self) {
        self.start_tick = self.host_tick();
    }

    /// Request a recording.
    ///
    /// The file is created once the host reports [`SignonState::Full`] after
    /// the full update requested here. Returns the path of the first file.
    pub fn start_recording(&mut self, name: &str, incremental: bool) -> Result<PathBuf> {
        if let Some(current) = &self.base_name {
            return Err(DemoError::AlreadyRecording(current.clone()));
        }
        if !self.config.enabled {
            return Err(DemoError::Config("demo recording is disabled".into()));
        }

        let mut base = validate_name(name)?;
        if incremental {
            base = next_incremental_name(self.store.as_ref(), &base)
                .ok_or_else(|| DemoError::InvalidName(format!("{base}: no free demo number")))?;
        }

        let path = demo_file_name(&base, 1);
        tracing::info!(path = %path.display(), "Demo recording requested");

        self.base_name = Some(base);
        self.demo_number = 1;
        self.reset_interpolation = false;
        self.last_error = None;
        self.host.request_full_update();
        Ok(path)
    }

    /// Stop recording, finalizing the open container
    pub fn stop_recording(&mut self) -> Option<RecordingSummary> {
        self.base_name.as_ref()?;

        self.message_data.clear();
        let summary = self.close_demo_file();
        self.base_name = None;
        self.demo_number = 0;
        summary
    }

    /// Track the host's connection milestones
    pub fn set_signon_state(&mut self, state: SignonState) {
        if !self.config.enabled {
            return;
        }

        match state {
            SignonState::New => {
                if self.demo.is_some() {
                    self.close_demo_file();
                    self.demo_number += 1;
                }
                self.startup_signon_buffer();
            }
            SignonState::Spawn => self.close_signon_after_packet = true,
            SignonState::Full => {
                if self.is_recording()
                    && self.demo.is_none()
                    && let Err(e) = self.startup_demo_file()
                {
                    self.fail(e);
                }
            }
        }
    }

    fn startup_signon_buffer(&mut self) {
        self.close_demo_file();
        match self.store.create(Path::new(&self.config.signon_buffer_name)) {
            Ok(stream) => {
                self.signon = Some(DemoWriter::headless(stream));
                tracing::debug!(buffer = %self.config.signon_buffer_name, "Buffering signon data");
            }
            Err(e) => {
                tracing::error!(error = %e, "Couldn't open temporary signon buffer");
                self.last_error = Some(e.into());
            }
        }
    }

    fn startup_demo_file(&mut self) -> Result<()> {
        let Some(base) = self.base_name.clone() else {
            return Ok(());
        };
        let path = demo_file_name(&base, self.demo_number);

        let mut signon = self
            .store
            .open(Path::new(&self.config.signon_buffer_name))?;
        let signon_length = signon.seek(SeekFrom::End(0))?;
        signon.seek(SeekFrom::Start(0))?;

        let session = self.host.session_info();
        let header = DemoHeader {
            network_protocol: session.network_protocol,
            server_name: session.server_name,
            client_name: session.client_name,
            map_name: session.map_name,
            game_directory: session.game_directory,
            signon_length: signon_length as i32,
            ..Default::default()
        };

        let mut writer = DemoWriter::create(self.store.create(&path)?, header)?;
        writer.append_raw(&mut signon, signon_length)?;

        self.frame_count = 0;
        self.resync_clock();
        writer.write_record(&DemoRecord::new(0, 0, RecordPayload::SyncTick))?;

        let callbacks = self.host.custom_data_callbacks();
        if !callbacks.is_empty() {
            writer.write_record(&DemoRecord::new(
                0,
                0,
                RecordPayload::CustomData {
                    callback: CUSTOM_DATA_TABLE_INDEX,
                    data: encode_callback_table(&callbacks),
                },
            ))?;
        }

        self.demo = Some(OpenDemo { writer, path: path.clone() });
        self.last_snapshot_tick = 0;
        self.record_string_tables();
        for convar in self.host.demo_convars() {
            self.queue(DemoRecord::new(0, 0, RecordPayload::ConsoleCmd(convar)));
        }
        self.flush_queue()?;

        self.host.on_recording_started(&path);
        tracing::info!(path = %path.display(), signon_length, "Recording demo");
        Ok(())
    }

    fn close_demo_file(&mut self) -> Option<RecordingSummary> {
        if let Some(mut signon) = self.signon.take()
            && let Err(e) = signon.close()
        {
            tracing::warn!(error = %e, "Failed to flush signon buffer");
        }
        self.close_signon_after_packet = false;

        if self.demo.is_none() {
            self.queued.clear();
            return None;
        }

        match self.finish_demo_file() {
            Ok(summary) => {
                self.host.on_recording_stopped(&summary.path);
                tracing::info!(
                    path = %summary.path.display(),
                    time = summary.time,
                    frames = summary.frames,
                    "Completed demo"
                );
                self.last_summary = Some(summary.clone());
                Some(summary)
            }
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    fn finish_demo_file(&mut self) -> Result<RecordingSummary> {
        self.flush_queue()?;
        let tick = self.recording_tick();
        let time = self.host.tick_interval() * tick as f32;
        let frames = self.frame_count;

        let Some(mut demo) = self.demo.take() else {
            return Err(DemoError::Closed);
        };
        demo.writer
            .write_record(&DemoRecord::new(tick, 0, RecordPayload::Stop))?;
        demo.writer.update_totals(tick, time, frames);
        demo.writer.close()?;

        Ok(RecordingSummary {
            path: demo.path,
            ticks: tick,
            time,
            frames,
        })
    }

    /// Abandon the recording after an error. The session continues.
    fn fail(&mut self, error: DemoError) {
        tracing::error!(error = %error, "Demo recording aborted");
        self.signon = None;
        self.demo = None;
        self.queued.clear();
        self.message_data.clear();
        self.close_signon_after_packet = false;
        self.base_name = None;
        self.demo_number = 0;
        self.last_error = Some(error);
    }

    /// Accumulate outgoing network data for the current frame
    pub fn record_messages(&mut self, data: &[u8]) {
        if self.signon.is_some() || self.demo.is_some() {
            self.message_data.extend_from_slice(data);
        }
    }

    /// Frame boundary: write the accumulated data as one record
    pub fn record_packet(&mut self) {
        if let Err(e) = self.write_messages() {
            self.fail(e);
            return;
        }
        self.message_data.clear();

        if self.close_signon_after_packet {
            self.close_demo_file();
        }
    }

    fn client_cmd_info(&mut self) -> CommandInfo {
        let mut info = CommandInfo::default();
        let slots = self.host.active_slots().min(MAX_SPLITSCREEN_CLIENTS);
        for slot in 0..slots {
            let split = info.slot_mut(slot);
            split.pose = self.host.view_pose(slot);
            if self.reset_interpolation {
                split.transition = ViewTransition::Discontinuous;
            }
        }
        self.reset_interpolation = false;
        info
    }

    fn write_messages(&mut self) -> Result<()> {
        if self.message_data.is_empty() {
            return Ok(());
        }

        if self.demo.is_some() {
            self.flush_queue()?;
            let tick = self.recording_tick();
            let packet = PacketData {
                info: self.client_cmd_info(),
                sequence: self.host.sequence_info(),
                data: std::mem::take(&mut self.message_data),
            };
            self.frame_count += 1;
            if let Some(demo) = self.demo.as_mut() {
                demo.writer
                    .write_record(&DemoRecord::new(tick, 0, RecordPayload::Packet(packet)))?;
            }
            tracing::trace!(tick, frame = self.frame_count, "Wrote demo packet");
            self.after_packet(tick)?;
        } else if self.signon.is_some() {
            let tick = self.recording_tick();
            let packet = PacketData {
                info: self.client_cmd_info(),
                sequence: self.host.sequence_info(),
                data: std::mem::take(&mut self.message_data),
            };
            if let Some(signon) = self.signon.as_mut() {
                signon.write_record(&DemoRecord::new(tick, 0, RecordPayload::Signon(packet)))?;
            }
        }
        Ok(())
    }

    fn after_packet(&mut self, tick: i32) -> Result<()> {
        let snapshot_interval = self.config.snapshot_interval_ticks as i32;
        if snapshot_interval > 0 && tick - self.last_snapshot_tick >= snapshot_interval {
            self.last_snapshot_tick = tick;
            self.record_string_tables();
        }

        let flush_interval = self.config.flush_interval_frames as i32;
        if flush_interval > 0 && self.frame_count % flush_interval == 0 {
            let time = self.host.tick_interval() * tick as f32;
            let frames = self.frame_count;
            if let Some(demo) = self.demo.as_mut() {
                demo.writer.update_totals(tick, time, frames);
                demo.writer.flush_header()?;
            }
        }
        Ok(())
    }

    fn queue(&mut self, record: DemoRecord) {
        if self.demo.is_some() {
            self.queued.push(record);
        }
    }

    fn flush_queue(&mut self) -> Result<()> {
        let Some(demo) = self.demo.as_mut() else {
            self.queued.clear();
            return Ok(());
        };
        for record in self.queued.drain(..) {
            demo.writer.write_record(&record)?;
        }
        Ok(())
    }

    /// Append a locally typed console command
    pub fn record_command(&mut self, command: &str) {
        if !self.is_recording() || command.is_empty() || !self.config.record_commands {
            return;
        }
        let tick = self.recording_tick();
        self.queue(DemoRecord::new(
            tick,
            0,
            RecordPayload::ConsoleCmd(command.to_string()),
        ));
    }

    /// Append the encoded user command `command_number` for `slot`
    pub fn record_user_input(&mut self, command_number: i32, slot: usize) {
        if self.demo.is_none() {
            return;
        }
        let Some(data) = self.host.encode_user_command(slot, command_number) else {
            tracing::debug!(command_number, slot, "No user command to record");
            return;
        };
        let tick = self.recording_tick();
        self.queue(DemoRecord::new(
            tick,
            slot as u8,
            RecordPayload::UserCmd {
                sequence: command_number,
                data,
            },
        ));
    }

    pub fn record_custom_data(&mut self, callback: i32, data: &[u8]) {
        let tick = self.recording_tick();
        self.queue(DemoRecord::new(
            tick,
            0,
            RecordPayload::CustomData {
                callback,
                data: data.to_vec(),
            },
        ));
    }

    /// Snapshot the host's string tables
    pub fn record_string_tables(&mut self) {
        if self.demo.is_none() {
            return;
        }
        let data = self.host.string_table_snapshot().encode();
        let tick = self.recording_tick();
        self.queue(DemoRecord::new(tick, 0, RecordPayload::StringTables(data)));
    }

    /// Snapshot the host's network schema
    pub fn record_server_classes(&mut self) {
        if self.demo.is_none() {
            return;
        }
        let data = self.host.network_schema_snapshot();
        let tick = self.recording_tick();
        self.queue(DemoRecord::new(tick, 0, RecordPayload::DataTables(data)));
    }

    /// Mark the next packet's view as discontinuous
    pub fn reset_interpolation(&mut self) {
        self.reset_interpolation = true;
    }
}

impl<H: RecordingHost> Drop for Recorder<H> {
    fn drop(&mut self) {
        if self.demo.is_some() || self.signon.is_some() {
            self.close_demo_file();
        }
    }
}
