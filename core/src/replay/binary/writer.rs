//! Demo container writer
//!
//! Writes the header and records. The header trailer is rewritten in place by
//! [`DemoWriter::flush_header`] and [`DemoWriter::close`].

use crate::error::{DemoError, Result};
use crate::replay::types::*;
use byteorder::{LittleEndian, WriteBytesExt};
use glam::Vec3;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Writer for the demo container format
pub struct DemoWriter<W: Write + Seek> {
    writer: W,
    header: DemoHeader,
    /// Headless writers buffer signon data and never write a header
    headless: bool,
    in_flight: Option<CommandKind>,
    closed: bool,
}

impl<W: Write + Seek> DemoWriter<W> {
    /// Create a writer and emit a provisional header
    pub fn create(mut writer: W, header: DemoHeader) -> Result<Self> {
        writer.seek(SeekFrom::Start(0))?;
        write_header(&mut writer, &header)?;
        Ok(Self {
            writer,
            header,
            headless: false,
            in_flight: None,
            closed: false,
        })
    }

    /// Create a writer with no header, used to buffer signon records
    pub fn headless(writer: W) -> Self {
        Self {
            writer,
            header: DemoHeader::default(),
            headless: true,
            in_flight: None,
            closed: false,
        }
    }

    pub fn header(&self) -> &DemoHeader {
        &self.header
    }

    pub fn is_headless(&self) -> bool {
        self.headless
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.writer.stream_position()?)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(DemoError::Closed);
        }
        Ok(())
    }

    /// Begin a record. Its payload must be written before the next header.
    pub fn write_command_header(&mut self, kind: CommandKind, tick: i32, slot: u8) -> Result<()> {
        self.ensure_open()?;
        if let Some(pending) = self.in_flight {
            let position = self.position()?;
            return Err(DemoError::framing(
                position,
                format!("{} record still in flight", pending.name()),
            ));
        }
        self.writer.write_u8(kind as u8)?;
        self.writer.write_i32::<LittleEndian>(tick)?;
        self.writer.write_u8(slot)?;
        if !matches!(kind, CommandKind::SyncTick | CommandKind::Stop) {
            self.in_flight = Some(kind);
        }
        Ok(())
    }

    /// Complete the in-flight record with its payload
    pub fn write_payload(&mut self, payload: &RecordPayload) -> Result<()> {
        self.ensure_open()?;
        let kind = payload.kind();
        let expected = match kind {
            CommandKind::SyncTick | CommandKind::Stop => None,
            other => Some(other),
        };
        if self.in_flight != expected {
            let position = self.position()?;
            return Err(DemoError::framing(
                position,
                format!("{} payload does not match the open record", kind.name()),
            ));
        }

        match payload {
            RecordPayload::Signon(packet) | RecordPayload::Packet(packet) => {
                self.write_command_info(&packet.info)?;
                self.writer
                    .write_i32::<LittleEndian>(packet.sequence.in_sequence)?;
                self.writer
                    .write_i32::<LittleEndian>(packet.sequence.out_sequence_ack)?;
                self.write_raw_data(&packet.data)?;
            }
            RecordPayload::SyncTick | RecordPayload::Stop => {}
            RecordPayload::ConsoleCmd(command) => self.write_raw_data(command.as_bytes())?,
            RecordPayload::UserCmd { sequence, data } => {
                self.writer.write_i32::<LittleEndian>(*sequence)?;
                self.write_raw_data(data)?;
            }
            RecordPayload::DataTables(data) | RecordPayload::StringTables(data) => {
                self.write_raw_data(data)?
            }
            RecordPayload::CustomData { callback, data } => {
                self.writer.write_i32::<LittleEndian>(*callback)?;
                self.write_raw_data(data)?;
            }
        }

        self.in_flight = None;
        Ok(())
    }

    /// Write header and payload of one record
    pub fn write_record(&mut self, record: &DemoRecord) -> Result<()> {
        self.write_command_header(record.payload.kind(), record.tick, record.slot)?;
        self.write_payload(&record.payload)
    }

    fn write_command_info(&mut self, info: &CommandInfo) -> io::Result<()> {
        for split in &info.slots {
            self.writer
                .write_u32::<LittleEndian>(split.transition.to_u32())?;
            self.write_vec3(split.pose.origin)?;
            self.write_vec3(split.pose.angles)?;
            self.write_vec3(split.pose.local_angles)?;
        }
        Ok(())
    }

    fn write_vec3(&mut self, v: Vec3) -> io::Result<()> {
        self.writer.write_f32::<LittleEndian>(v.x)?;
        self.writer.write_f32::<LittleEndian>(v.y)?;
        self.writer.write_f32::<LittleEndian>(v.z)?;
        Ok(())
    }

    fn write_raw_data(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > MAX_PAYLOAD_SIZE {
            let position = self.position()?;
            return Err(DemoError::framing(
                position,
                format!("payload of {} bytes exceeds {MAX_PAYLOAD_SIZE}", data.len()),
            ));
        }
        self.writer.write_u32::<LittleEndian>(data.len() as u32)?;
        self.writer.write_all(data)?;
        Ok(())
    }

    /// Copy `len` raw bytes from `source`, used for the buffered signon prefix
    pub fn append_raw<R: Read>(&mut self, source: &mut R, len: u64) -> Result<u64> {
        self.ensure_open()?;
        let copied = io::copy(&mut source.take(len), &mut self.writer)?;
        if copied != len {
            let position = self.position()?;
            return Err(DemoError::framing(
                position,
                format!("copied {copied} of {len} signon bytes"),
            ));
        }
        Ok(copied)
    }

    /// Update the provisional trailer values held in memory
    pub fn update_totals(&mut self, ticks: i32, time: f32, frames: i32) {
        self.header.playback_ticks = ticks;
        self.header.playback_time = time;
        self.header.playback_frames = frames;
    }

    pub fn set_signon_length(&mut self, len: i32) {
        self.header.signon_length = len;
    }

    /// Rewrite the header in place and return to the end of the stream
    pub fn flush_header(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.headless {
            let resume = self.writer.stream_position()?;
            self.writer.seek(SeekFrom::Start(0))?;
            write_header(&mut self.writer, &self.header)?;
            self.writer.seek(SeekFrom::Start(resume))?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Finalize the trailer. Calling this again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if let Some(pending) = self.in_flight.take() {
            tracing::warn!(kind = pending.name(), "Closing demo with a record in flight");
        }
        self.flush_header()?;
        self.closed = true;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn write_header<W: Write>(writer: &mut W, header: &DemoHeader) -> io::Result<()> {
    writer.write_all(&DEMO_HEADER_STAMP)?;
    writer.write_i32::<LittleEndian>(header.demo_protocol)?;
    writer.write_i32::<LittleEndian>(header.network_protocol)?;
    write_name(writer, &header.server_name)?;
    write_name(writer, &header.client_name)?;
    write_name(writer, &header.map_name)?;
    write_name(writer, &header.game_directory)?;
    writer.write_f32::<LittleEndian>(header.playback_time)?;
    writer.write_i32::<LittleEndian>(header.playback_ticks)?;
    writer.write_i32::<LittleEndian>(header.playback_frames)?;
    writer.write_i32::<LittleEndian>(header.signon_length)?;
    Ok(())
}

/// Nul-padded, truncated on a character boundary so the last byte stays nul
fn write_name<W: Write>(writer: &mut W, name: &str) -> io::Result<()> {
    let mut end = name.len().min(MAX_OSPATH - 1);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let mut buf = [0u8; MAX_OSPATH];
    buf[..end].copy_from_slice(&name.as_bytes()[..end]);
    writer.write_all(&buf)
}
