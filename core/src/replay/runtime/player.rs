//! Demo player
//!
//! Reads a container back at the pace of the host clock. Control records are
//! applied as soon as they are reached; packets wait until the playback tick
//! catches up with them. While a skip target is set the gate is lifted and
//! the clock follows the packets instead.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::clock::{FastForwardRamp, PlaybackClock};
use super::interp::{ViewInterpolator, ViewSample};
use super::timedemo::{TimeDemoResults, TimeDemoStats};
use crate::config::DemoConfig;
use crate::error::{DemoError, Result};
use crate::host::{DemoStream, FileStore, PlaybackHost};
use crate::replay::binary::DemoReader;
use crate::replay::scan::{
    HighlightComposer, HighlightSegment, ImportanceScanner, ImportantEventTable,
    ImportantTickIndex,
};
use crate::replay::tables::decode_callback_table;
use crate::replay::types::{
    CUSTOM_DATA_TABLE_INDEX, CommandHeader, CommandInfo, CommandKind, DemoHeader,
    MAX_SPLITSCREEN_CLIENTS, PacketData, RecordPayload, ViewPose, ViewTransition,
};

/// Look-ahead entries this many ticks behind the playback tick are dropped
const PARSE_AHEAD_KEEP_TICKS: i32 = 32;

/// Follow one player through a highlight reel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HighlightRequest {
    pub subject: u64,
    /// Follow the subject's deaths instead of their kills
    pub lowlights: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackOptions {
    /// Benchmark: read one packet per frame and ignore real-time pacing
    pub time_demo: bool,
    /// Skip to this tick once the first resync record is reached
    pub starting_tick: Option<i32>,
    pub highlight: Option<HighlightRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    Closed,
    /// Before the first resync record; nothing is gated
    SignonReplay,
    Steady,
}

/// Result of one [`Player::read_packet`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A signon or network packet was delivered
    Packet { tick: i32 },
    /// The next packet is not due this frame
    NotYet,
    Suspended,
    Paused,
    /// A stop record ended playback
    Finished,
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct QueuedInfo {
    tick: i32,
    file_pos: u64,
    info: CommandInfo,
}

struct ImportantTicks {
    index: ImportantTickIndex,
    events: ImportantEventTable,
}

struct OpenDemo {
    reader: DemoReader<Box<dyn DemoStream>>,
    path: PathBuf,
    header: DemoHeader,
    options: PlaybackOptions,
    healed: bool,
}

/// Plays containers from a [`FileStore`] into the client of `H`
pub struct Player<H: PlaybackHost> {
    host: H,
    store: Box<dyn FileStore>,
    config: DemoConfig,
    demo: Option<OpenDemo>,
    state: PlaybackState,
    clock: PlaybackClock,
    restart_position: Option<u64>,
    pending_start_tick: Option<i32>,
    packet_tick: i32,
    last_info: CommandInfo,
    look_ahead: VecDeque<QueuedInfo>,
    interpolate_view: bool,
    interpolators: [ViewInterpolator; MAX_SPLITSCREEN_CLIENTS],
    previous_view_tick: i32,
    /// View blending is held off until a pause-on-arrival seek lands
    seek_interp_hold: bool,
    tick_to_pause_on: Option<i32>,
    suspended: bool,
    callback_names: Vec<String>,
    frame: u64,
    packet_read_frame: Option<u64>,
    stats: TimeDemoStats,
    started_at: f64,
    benchframe: Option<(i32, String)>,
    fast_forward: Option<FastForwardRamp>,
    important: Option<ImportantTicks>,
    highlights: Vec<HighlightSegment>,
    current_highlight: Option<usize>,
    last_results: Option<TimeDemoResults>,
    last_error: Option<DemoError>,
    warning: Option<DemoError>,
}

/// Resolve a goto argument: an absolute tick, `N%` of the demo, or `Nm` minutes.
///
/// The result is clamped to `[0, total_ticks]` when the total is known.
pub fn parse_goto_target(arg: &str, total_ticks: i32, tick_interval: f32) -> Option<i32> {
    let arg = arg.trim();
    let tick = if let Some(percent) = arg.strip_suffix('%') {
        let percent: f32 = percent.trim().parse().ok()?;
        (total_ticks as f32 * percent / 100.0) as i32
    } else if let Some(minutes) = arg.strip_suffix(['m', 'M']) {
        let minutes: f32 = minutes.trim().parse().ok()?;
        if tick_interval <= 0.0 {
            return None;
        }
        (minutes * 60.0 / tick_interval) as i32
    } else {
        arg.parse().ok()?
    };

    if total_ticks > 0 {
        Some(tick.clamp(0, total_ticks))
    } else {
        Some(tick.max(0))
    }
}

impl<H: PlaybackHost> Player<H> {
    pub fn new(host: H, store: Box<dyn FileStore>, config: DemoConfig) -> Self {
        let limits = config.playback.interpolation_limits();
        let interval = host_interval(&host, &config);
        let warmup = config.playback.timedemo_warmup_ticks;
        let max_timescale = config.playback.max_timescale;
        Self {
            host,
            store,
            config,
            demo: None,
            state: PlaybackState::Closed,
            clock: PlaybackClock::new(interval, max_timescale),
            restart_position: None,
            pending_start_tick: None,
            packet_tick: 0,
            last_info: CommandInfo::default(),
            look_ahead: VecDeque::new(),
            interpolate_view: false,
            interpolators: std::array::from_fn(|_| ViewInterpolator::new(limits)),
            previous_view_tick: 0,
            seek_interp_hold: false,
            tick_to_pause_on: None,
            suspended: false,
            callback_names: Vec::new(),
            frame: 0,
            packet_read_frame: None,
            stats: TimeDemoStats::new(warmup),
            started_at: 0.0,
            benchframe: None,
            fast_forward: None,
            important: None,
            highlights: Vec::new(),
            current_highlight: None,
            last_results: None,
            last_error: None,
            warning: None,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &DemoConfig {
        &self.config
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.demo.is_some()
    }

    pub fn is_time_demo(&self) -> bool {
        self.demo.as_ref().is_some_and(|d| d.options.time_demo)
    }

    pub fn header(&self) -> Option<&DemoHeader> {
        self.demo.as_ref().map(|d| &d.header)
    }

    pub fn path(&self) -> Option<&Path> {
        self.demo.as_ref().map(|d| d.path.as_path())
    }

    /// The trailer of the open demo was rebuilt from its records
    pub fn healed(&self) -> bool {
        self.demo.as_ref().is_some_and(|d| d.healed)
    }

    pub fn total_ticks(&self) -> i32 {
        self.demo.as_ref().map_or(0, |d| d.header.playback_ticks)
    }

    pub fn playback_tick(&self) -> i32 {
        self.clock.playback_tick()
    }

    /// Tick of the most recently read record
    pub fn packet_tick(&self) -> i32 {
        self.packet_tick
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    /// Command-Info of the last delivered packet
    pub fn last_command_info(&self) -> &CommandInfo {
        &self.last_info
    }

    pub fn last_error(&self) -> Option<&DemoError> {
        self.last_error.as_ref()
    }

    /// Non-fatal problem found while opening the current demo
    pub fn warning(&self) -> Option<&DemoError> {
        self.warning.as_ref()
    }

    /// Results of the last time-demo that ended on its stop record
    pub fn take_results(&mut self) -> Option<TimeDemoResults> {
        self.last_results.take()
    }

    /// Paused, outside of signon and seeks
    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Steady && !self.clock.is_skipping() && self.clock.is_paused()
    }

    pub fn is_skipping(&self) -> bool {
        self.clock.is_skipping()
    }

    fn ticks_per_frame(&self) -> i32 {
        match self.demo.as_ref().map(|d| &d.header) {
            Some(h) if h.playback_frames > 0 => (h.playback_ticks / h.playback_frames).max(1),
            _ => 1,
        }
    }

    /// Open `path` and start playing it from the beginning.
    ///
    /// A demo that is already playing is stopped first. Unsupported headers
    /// fail here before any record is delivered.
    pub fn open(&mut self, path: &Path, options: PlaybackOptions) -> Result<()> {
        if self.demo.is_some() {
            self.stop_playback();
        }
        self.last_error = None;
        self.warning = None;
        self.last_results = None;

        let stream = self.store.open(path).inspect_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Couldn't open demo");
        })?;
        let mut reader = DemoReader::new(stream)?;
        let mut header = reader.read_header()?;

        let interval = host_interval(&self.host, &self.config);
        let mut healed = false;
        if header.is_incomplete() {
            if self.config.validation.strict {
                tracing::warn!(path = %path.display(), "Demo is incomplete, playing best-effort");
            } else {
                let totals = reader.measure()?;
                if totals.can_heal() {
                    header.set_totals(totals.highest_tick, totals.packets, interval);
                    healed = true;
                    tracing::info!(
                        path = %path.display(),
                        ticks = totals.highest_tick,
                        frames = totals.packets,
                        "Healed incomplete demo header"
                    );
                }
            }
            if !healed {
                self.warning = Some(DemoError::IncompleteContainer);
            }
        }

        self.clock = PlaybackClock::new(interval, self.config.playback.max_timescale);
        self.state = PlaybackState::SignonReplay;
        self.restart_position = None;
        self.pending_start_tick = options.starting_tick.filter(|&t| t > 0);
        self.packet_tick = 0;
        self.last_info = CommandInfo::default();
        self.look_ahead.clear();
        self.interpolate_view = false;
        for interpolator in &mut self.interpolators {
            interpolator.reset();
        }
        self.previous_view_tick = 0;
        self.seek_interp_hold = false;
        self.tick_to_pause_on = None;
        self.suspended = false;
        self.callback_names.clear();
        self.frame = 0;
        self.packet_read_frame = None;
        self.stats = TimeDemoStats::new(self.config.playback.timedemo_warmup_ticks);
        self.started_at = self.host.real_time();
        self.fast_forward = None;
        self.important = None;
        self.highlights.clear();
        self.current_highlight = None;

        self.host.on_playback_start(&header);
        tracing::info!(
            path = %path.display(),
            map = %header.map_name,
            ticks = header.playback_ticks,
            time_demo = options.time_demo,
            "Playing demo"
        );

        self.demo = Some(OpenDemo {
            reader,
            path: path.to_path_buf(),
            header,
            options,
            healed,
        });
        Ok(())
    }

    /// Stop playback and notify the client.
    ///
    /// Returns the benchmark results of a time-demo once timing has started.
    pub fn stop_playback(&mut self) -> Option<TimeDemoResults> {
        let demo = self.demo.take()?;
        let now = self.host.real_time();

        let results = if demo.options.time_demo {
            let results = self.stats.results(now);
            match &results {
                Some(r) => tracing::info!(path = %demo.path.display(), %r, "Time demo finished"),
                None => tracing::warn!(path = %demo.path.display(), "Time demo ended during warmup"),
            }
            results
        } else {
            let seconds = (now - self.started_at).max(0.0);
            tracing::info!(
                path = %demo.path.display(),
                ticks = self.clock.playback_tick(),
                frames = self.frame,
                seconds,
                "Demo playback finished"
            );
            None
        };

        self.state = PlaybackState::Closed;
        self.clock.set_timescale(1.0);
        self.clock.resume();
        self.clock.set_skip_target(None);
        self.fast_forward = None;
        self.look_ahead.clear();
        self.important = None;
        self.highlights.clear();
        self.current_highlight = None;
        self.host.on_playback_stop();
        results
    }

    /// Stop after a container or client error and disconnect cleanly
    fn fail(&mut self, error: DemoError) -> ReadOutcome {
        tracing::error!(error = %error, tick = self.packet_tick, "Demo playback aborted");
        self.host.disconnect();
        self.stop_playback();
        self.last_error = Some(error);
        ReadOutcome::Closed
    }

    /// Advance one client frame: move the clock, read every packet that is
    /// due and update the view.
    pub fn run_frame(&mut self, frame_time: f32) -> ReadOutcome {
        if self.demo.is_none() {
            return ReadOutcome::Closed;
        }
        self.frame += 1;

        if let Some(ramp) = self.fast_forward.as_mut() {
            let speed = ramp.advance(frame_time);
            self.clock.set_timescale(speed);
        }
        if self.is_time_demo() {
            self.clock.step();
        } else {
            self.clock.advance(frame_time);
        }

        let mut outcome = self.read_packet();
        while let ReadOutcome::Packet { .. } = outcome {
            outcome = self.read_packet();
        }

        if self.demo.is_some() {
            self.interpolate_viewpoint();
            if self.is_time_demo() {
                self.stats
                    .mark_frame(self.clock.playback_tick(), self.host.real_time());
            }
        }
        outcome
    }

    /// Read records up to and including the next due packet.
    pub fn read_packet(&mut self) -> ReadOutcome {
        if self.demo.is_none() {
            return ReadOutcome::Closed;
        }
        if self.suspended {
            return ReadOutcome::Suspended;
        }

        if self.current_highlight.is_some() && !self.clock.is_skipping() {
            self.drive_highlights();
        }
        if self.check_paused() {
            return ReadOutcome::Paused;
        }

        match self.read_due_packet() {
            Ok(Some((header, packet))) => match self.deliver_packet(header, packet) {
                Ok(()) => ReadOutcome::Packet { tick: header.tick },
                Err(e) => self.fail(e),
            },
            Ok(None) if self.demo.is_none() => ReadOutcome::Finished,
            Ok(None) => ReadOutcome::NotYet,
            Err(e) => self.fail(e),
        }
    }

    fn check_paused(&mut self) -> bool {
        if let Some(target) = self.clock.skip_target() {
            if target > self.clock.playback_tick() {
                return false;
            }
            self.clock.set_skip_target(None);
            tracing::debug!(tick = self.clock.playback_tick(), "Skip complete");
        }
        if self.state != PlaybackState::Steady || !self.clock.is_paused() {
            return false;
        }
        if self.clock.check_auto_resume(self.host.real_time()) {
            tracing::debug!("Auto-resumed demo playback");
        }
        self.clock.is_paused()
    }

    /// Apply control records until a packet is due.
    ///
    /// `Ok(None)` means the next packet is not due yet, or a stop record
    /// closed the demo.
    fn read_due_packet(&mut self) -> Result<Option<(CommandHeader, PacketData)>> {
        loop {
            let demo = self.demo.as_mut().ok_or(DemoError::NotPlaying)?;
            let position = demo.reader.position()?;
            let Some(header) = demo.reader.read_command_header()? else {
                return Err(DemoError::framing(position, "demo ended without a stop record"));
            };
            self.packet_tick = header.tick;

            if let Some(pause_tick) = self.tick_to_pause_on
                && header.tick >= pause_tick
            {
                self.tick_to_pause_on = None;
                self.seek_interp_hold = false;
                self.clock.pause(None);
                tracing::debug!(tick = header.tick, "Paused on arrival");
            }

            if let Some(segment) = self.current_highlight.and_then(|i| self.highlights.get(i))
                && self.clock.is_skipping()
                && header.tick >= segment.seek_to_tick
            {
                self.clock.set_skip_target(None);
            }

            if !header.kind.is_control() {
                let skipping = self.clock.is_skipping();
                let hold = if demo.options.time_demo {
                    self.packet_read_frame == Some(self.frame) && !skipping
                } else {
                    self.state == PlaybackState::Steady
                        && header.tick > self.clock.playback_tick()
                        && !skipping
                };
                if hold {
                    demo.reader.seek_to(position)?;
                    return Ok(None);
                }
            }

            let payload = demo.reader.read_payload(header.kind)?;
            tracing::trace!(kind = header.kind.name(), tick = header.tick, "Demo record");

            match payload {
                RecordPayload::SyncTick => {
                    self.clock.resync();
                    self.restart_position = Some(demo.reader.position()?);
                    if self.state == PlaybackState::SignonReplay {
                        self.state = PlaybackState::Steady;
                        if let Some(tick) = self.pending_start_tick.take() {
                            self.clock.set_skip_target(Some(tick));
                        }
                    } else if let Some(target) = self.clock.skip_target()
                        && target <= self.clock.playback_tick()
                    {
                        self.clock.set_skip_target(None);
                    }
                }
                RecordPayload::Stop => {
                    tracing::debug!(tick = header.tick, "Demo stop record");
                    self.host.disconnect();
                    self.last_results = self.stop_playback();
                    return Ok(None);
                }
                RecordPayload::ConsoleCmd(command) => {
                    self.host.execute_console_command(&command);
                }
                RecordPayload::DataTables(data) => self.host.apply_network_schema(&data)?,
                RecordPayload::StringTables(data) => self.host.apply_string_tables(&data)?,
                RecordPayload::UserCmd { sequence, data } => {
                    self.host.decode_user_command(header.slot, sequence, &data)?;
                }
                RecordPayload::CustomData { callback, data } => {
                    self.dispatch_custom_data(callback, &data)?;
                }
                RecordPayload::Signon(packet) => return Ok(Some((header, packet))),
                RecordPayload::Packet(packet) => {
                    if self.clock.is_skipping() {
                        self.clock.jump_to(header.tick);
                    }
                    return Ok(Some((header, packet)));
                }
            }
        }
    }

    fn dispatch_custom_data(&mut self, callback: i32, data: &[u8]) -> Result<()> {
        if callback == CUSTOM_DATA_TABLE_INDEX {
            self.callback_names = decode_callback_table(data)?;
            tracing::debug!(callbacks = self.callback_names.len(), "Loaded custom data callbacks");
            return Ok(());
        }
        match usize::try_from(callback)
            .ok()
            .and_then(|i| self.callback_names.get(i))
        {
            Some(name) => self.host.apply_custom_data(name, data),
            None => tracing::warn!(callback, "Custom data for unknown callback"),
        }
        Ok(())
    }

    fn deliver_packet(&mut self, header: CommandHeader, packet: PacketData) -> Result<()> {
        if header.kind == CommandKind::Packet {
            self.packet_read_frame = Some(self.frame);
        }

        self.last_info = packet.info;
        for (slot, interpolator) in self.interpolators.iter_mut().enumerate() {
            interpolator.record_applied(packet.info.slot(slot).pose);
        }
        self.host.set_sequence_info(packet.sequence);
        self.host.apply_network_payload(header.tick, &packet.data)?;

        if self.is_time_demo() {
            self.clock.jump_to(header.tick);
        }
        self.interpolate_view = self.parse_ahead(header.tick);

        let benchframe_due = self
            .benchframe
            .as_ref()
            .is_some_and(|(tick, _)| *tick <= self.clock.playback_tick());
        if benchframe_due && let Some((tick, name)) = self.benchframe.take() {
            tracing::info!(tick, name = %name, "Capturing benchframe");
            self.host.capture_benchframe(&name);
        }
        Ok(())
    }

    /// Queue Command-Info of upcoming packets without consuming them.
    ///
    /// Returns whether interpolation samples are available.
    fn parse_ahead(&mut self, current_tick: i32) -> bool {
        let Some(demo) = self.demo.as_mut() else {
            return false;
        };
        let Ok(start) = demo.reader.position() else {
            return false;
        };

        while let Some(front) = self.look_ahead.front() {
            if front.tick < current_tick - PARSE_AHEAD_KEEP_TICKS && front.file_pos < start {
                self.look_ahead.pop_front();
            } else {
                break;
            }
        }

        if demo.options.time_demo {
            return false;
        }

        let window = self.config.playback.parse_ahead_ticks;
        let result = fill_look_ahead(&mut demo.reader, &mut self.look_ahead, current_tick, window);
        if let Err(e) = demo.reader.seek_to(start) {
            tracing::warn!(error = %e, "Couldn't rewind after look-ahead");
            return false;
        }
        match result {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!(error = %e, "Look-ahead stopped at malformed record");
                false
            }
        }
    }

    /// Pick the look-ahead pair bracketing `target` for `slot`.
    ///
    /// A discontinuous sample between the previous target and `target` takes
    /// precedence so a teleport is never skipped over.
    fn bracket(&self, slot: usize, target: i32) -> Option<(QueuedInfo, QueuedInfo)> {
        if self.look_ahead.len() < 2 {
            return None;
        }
        let mut latched: Option<usize> = None;
        for i in 0..self.look_ahead.len() - 1 {
            let (first, second) = (self.look_ahead[i], self.look_ahead[i + 1]);
            if first.tick <= target && second.tick > target {
                let at = latched.unwrap_or(i);
                return Some((self.look_ahead[at], self.look_ahead[at + 1]));
            }
            if latched.is_none()
                && second.tick > self.previous_view_tick
                && second.tick <= target
                && second.info.slot(slot).transition == ViewTransition::Discontinuous
            {
                latched = Some(i);
            }
        }
        None
    }

    fn interpolate_viewpoint(&mut self) {
        let target = self.clock.playback_tick() - 1;
        let interval = self.clock.tick_interval();
        let blend = self.interpolate_view
            && self.config.playback.interpolate_view
            && !self.seek_interp_hold
            && !self.clock.is_skipping();

        for slot in 0..MAX_SPLITSCREEN_CLIENTS {
            let last = *self.last_info.slot(slot);
            if last.pose == ViewPose::default() && last.transition == ViewTransition::Continuous {
                continue;
            }

            let pose = match self.bracket(slot, target).filter(|_| blend) {
                Some((prev, next)) => {
                    let span = (next.tick - prev.tick) as f32 * interval;
                    let elapsed =
                        (target - prev.tick) as f32 * interval + self.clock.tick_remainder();
                    let t = if span > 0.0 {
                        (elapsed / span).clamp(0.0, 1.0)
                    } else {
                        1.0
                    };
                    let sample = |entry: &QueuedInfo| ViewSample {
                        time: entry.tick as f32 * interval,
                        transition: entry.info.slot(slot).transition,
                        pose: entry.info.slot(slot).pose,
                    };
                    self.interpolators[slot].interpolate(&sample(&prev), &sample(&next), t)
                }
                None => last.pose,
            };
            self.host.set_view(slot, &pose);
        }
        self.previous_view_tick = target;
    }

    pub fn pause(&mut self, auto_resume_seconds: Option<f32>) {
        if self.demo.is_none() {
            return;
        }
        let deadline = auto_resume_seconds
            .filter(|s| *s > 0.0)
            .map(|s| self.host.real_time() + s as f64);
        self.clock.pause(deadline);
        tracing::info!(tick = self.clock.playback_tick(), "Demo playback paused");
    }

    pub fn resume(&mut self) {
        if self.demo.is_none() || !self.clock.is_paused() {
            return;
        }
        self.clock.resume();
        tracing::info!(tick = self.clock.playback_tick(), "Demo playback resumed");
    }

    pub fn toggle_pause(&mut self) {
        if self.clock.is_paused() {
            self.resume();
        } else {
            self.pause(None);
        }
    }

    /// Pause once a record at or after `tick` is read
    pub fn pause_at_tick(&mut self, tick: i32) {
        if self.demo.is_some() && tick >= 0 {
            self.tick_to_pause_on = Some(tick);
        }
    }

    pub fn set_timescale(&mut self, timescale: f32) {
        self.clock.set_timescale(timescale);
    }

    /// Suspend packet reading while an external driver owns timing
    pub fn set_packet_read_suspended(&mut self, suspended: bool) {
        if self.suspended == suspended {
            return;
        }
        self.suspended = suspended;
        if !suspended {
            self.clock.resync();
        }
    }

    pub fn begin_fast_forward(&mut self) {
        if self.demo.is_none() || self.fast_forward.is_some() {
            return;
        }
        let playback = &self.config.playback;
        let ramp = FastForwardRamp::new(
            playback.fast_forward_start_speed,
            playback.fast_forward_final_speed,
            playback.fast_forward_ramp_time,
            self.clock.timescale(),
        );
        self.clock.set_timescale(ramp.speed());
        self.fast_forward = Some(ramp);
    }

    pub fn end_fast_forward(&mut self) {
        if let Some(ramp) = self.fast_forward.take() {
            self.clock.set_timescale(ramp.restore_timescale());
        }
    }

    pub fn is_fast_forwarding(&self) -> bool {
        self.fast_forward.is_some()
    }

    /// Rewind to the byte after the last resync record and replay from there
    pub fn restart_playback(&mut self) {
        let Some(position) = self.restart_position else {
            tracing::warn!("No resync point to restart from");
            return;
        };
        let Some(demo) = self.demo.as_mut() else {
            return;
        };
        if let Err(e) = demo.reader.seek_to(position) {
            self.fail(e);
            return;
        }
        self.clock.resync();
        self.look_ahead.clear();
        self.packet_read_frame = None;
        for interpolator in &mut self.interpolators {
            interpolator.reset();
        }
        self.host.on_playback_restart();
        tracing::debug!(position, "Restarted demo at resync point");
    }

    /// Seek to `tick`, or by `tick` when `relative`.
    ///
    /// Backward seeks rewind to the last resync point and replay forward.
    /// With `pause`, or when already paused, playback pauses on arrival.
    pub fn skip_to_tick(&mut self, tick: i32, relative: bool, pause: bool) {
        if self.demo.is_none() || self.suspended {
            return;
        }
        let current = self.clock.playback_tick();
        let target = if relative {
            current.saturating_add(tick)
        } else {
            tick
        };
        if target < 0 {
            return;
        }

        if target < current {
            self.restart_playback();
            if self.demo.is_none() {
                return;
            }
        }
        if target != current {
            self.clock.set_skip_target(Some(target));
        }
        tracing::info!(from = current, to = target, "Skipping demo");

        if pause || self.clock.is_paused() {
            self.tick_to_pause_on = Some(target.saturating_add(self.ticks_per_frame()));
            self.seek_interp_hold = true;
            self.clock.resume();
        }
    }

    /// Seek using a goto argument (see [`parse_goto_target`]). Returns false
    /// if the argument does not parse.
    pub fn goto(&mut self, arg: &str, relative: bool, pause: bool) -> bool {
        match parse_goto_target(arg, self.total_ticks(), self.clock.tick_interval()) {
            Some(tick) => {
                self.skip_to_tick(tick, relative, pause);
                true
            }
            None => false,
        }
    }

    /// Index important events in the open demo.
    ///
    /// Runs on the playback reader and restores its position. When the demo
    /// was opened with a highlight request the reel is built right away.
    pub fn scan_important_ticks(&mut self, scanner: &ImportanceScanner<'_>) -> Result<usize> {
        let demo = self.demo.as_mut().ok_or(DemoError::NotPlaying)?;
        let highlight = demo.options.highlight;
        let report = scanner.scan(&mut demo.reader, None, None)?;
        let count = report.index.len();
        tracing::info!(count, "Indexed important ticks");

        self.important = Some(ImportantTicks {
            index: report.index,
            events: scanner.events().clone(),
        });
        if let Some(request) = highlight {
            self.build_highlights(request.subject, request.lowlights);
        }
        Ok(count)
    }

    pub fn important_ticks(&self) -> Option<&ImportantTickIndex> {
        self.important.as_ref().map(|i| &i.index)
    }

    /// Compose and start a highlight reel. Returns the number of segments;
    /// zero leaves normal playback in place.
    pub fn build_highlights(&mut self, subject: u64, lowlights: bool) -> usize {
        let Some(important) = &self.important else {
            return 0;
        };
        let composer =
            HighlightComposer::from_config(&self.config.highlights, self.clock.tick_interval());
        self.highlights =
            composer.compose(&important.index, subject, lowlights, self.total_ticks());
        self.current_highlight = (!self.highlights.is_empty()).then_some(0);
        tracing::info!(subject, lowlights, segments = self.highlights.len(), "Highlight reel ready");
        self.highlights.len()
    }

    pub fn highlights(&self) -> &[HighlightSegment] {
        &self.highlights
    }

    pub fn current_highlight(&self) -> Option<usize> {
        self.current_highlight
    }

    fn drive_highlights(&mut self) {
        let Some(mut index) = self.current_highlight else {
            return;
        };
        let tick = self.clock.playback_tick();

        if self
            .highlights
            .get(index)
            .is_some_and(|s| tick >= s.play_to_tick)
        {
            index += 1;
            if index >= self.highlights.len() {
                self.current_highlight = None;
                self.clock.set_timescale(1.0);
                self.host.on_highlight_progress(false, tick, tick);
                tracing::info!(tick, "Highlight reel finished");
                return;
            }
            self.current_highlight = Some(index);
        }

        let Some(segment) = self.highlights.get(index).copied() else {
            return;
        };
        if tick < segment.seek_to_tick {
            self.host
                .on_highlight_progress(true, tick, segment.play_to_tick);
            self.clock.set_skip_target(Some(segment.seek_to_tick));
        } else if tick < segment.fast_forward_to_tick {
            self.host
                .on_highlight_progress(true, tick, segment.play_to_tick);
            self.clock
                .set_timescale(self.config.highlights.fast_forward_speed);
        } else {
            self.clock.set_timescale(1.0);
            self.host
                .on_highlight_progress(false, tick, segment.play_to_tick);
        }
    }

    /// Seek to important tick `index`, honouring its event's lead-in.
    pub fn skip_to_important_tick(&mut self, index: usize) -> bool {
        if self.demo.is_none() || self.suspended {
            return false;
        }
        let Some(important) = &self.important else {
            return false;
        };
        let Some(entry) = important.index.get(index) else {
            return false;
        };
        let seek_before = important
            .events
            .get(entry.event_index)
            .map_or(0.0, |e| e.seek_time_before);
        let (event_tick, previous_tick) = (entry.tick, entry.previous_tick);

        let current = self.clock.playback_tick();
        let ticks_before = (seek_before / self.clock.tick_interval()) as i32;
        let mut target = previous_tick;
        if ticks_before > 0 {
            target = event_tick.saturating_sub(ticks_before);
            if event_tick >= current && target < current {
                target = current;
            }
            target = target.max(0);
        }

        if target < current {
            self.restart_playback();
            if self.demo.is_none() {
                return false;
            }
        }
        if target != current {
            self.clock.set_skip_target(Some(target));
        }
        if self.clock.is_paused() {
            self.tick_to_pause_on = Some(event_tick.saturating_add(self.ticks_per_frame()));
            self.seek_interp_hold = true;
            self.clock.resume();
        }
        tracing::info!(index, event_tick, target, "Skipping to important tick");
        true
    }

    /// Seek to the next important tick after the playback tick
    pub fn skip_to_next_important(&mut self, event: Option<&str>) -> bool {
        let tick = self.clock.playback_tick();
        match self
            .important
            .as_ref()
            .and_then(|i| i.index.find_next(tick, event))
        {
            Some(index) => self.skip_to_important_tick(index),
            None => false,
        }
    }

    /// Ask the client to capture a frame once `tick` is reached
    pub fn set_benchframe(&mut self, tick: i32, name: impl Into<String>) {
        self.benchframe = Some((tick, name.into()));
    }
}

impl<H: PlaybackHost> Drop for Player<H> {
    fn drop(&mut self) {
        self.stop_playback();
    }
}

fn host_interval<H: PlaybackHost>(host: &H, config: &DemoConfig) -> f32 {
    let interval = host.tick_interval();
    if interval > 0.0 {
        interval
    } else {
        config.playback.headless_tick_interval
    }
}

/// Read packet Command-Info up to `window` ticks past `current_tick`.
///
/// Stops at resync and stop records. The caller restores the position.
fn fill_look_ahead<R: std::io::Read + std::io::Seek>(
    reader: &mut DemoReader<R>,
    queue: &mut VecDeque<QueuedInfo>,
    current_tick: i32,
    window: i32,
) -> Result<bool> {
    loop {
        let Some(header) = reader.read_command_header()? else {
            return Ok(false);
        };
        match header.kind {
            CommandKind::SyncTick | CommandKind::Stop => return Ok(false),
            CommandKind::Packet | CommandKind::Signon => {}
            other => {
                reader.skip_payload(other)?;
                continue;
            }
        }

        let file_pos = reader.position()?;
        let (RecordPayload::Packet(packet) | RecordPayload::Signon(packet)) =
            reader.read_payload(header.kind)?
        else {
            continue;
        };
        let info = packet.info;

        if !queue.iter().any(|q| q.file_pos == file_pos) {
            if queue.back().is_some_and(|last| last.tick > header.tick) {
                queue.clear();
            }
            queue.push_back(QueuedInfo {
                tick: header.tick,
                file_pos,
                info,
            });
        }

        if header.tick - current_tick > window {
            return Ok(true);
        }
    }
}
