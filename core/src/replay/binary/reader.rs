//! Demo container reader
//!
//! Reads the header and self-framed records with bounds checking against the
//! remaining file size.

use crate::error::{DemoError, Result};
use crate::replay::types::*;
use byteorder::{LittleEndian, ReadBytesExt};
use glam::Vec3;
use std::io::{Read, Seek, SeekFrom};

/// Reader for the demo container format
pub struct DemoReader<R: Read + Seek> {
    reader: R,
    len: u64,
}

impl<R: Read + Seek> DemoReader<R> {
    /// Create a new reader positioned at the start of the stream
    pub fn new(mut reader: R) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self { reader, len })
    }

    /// Total length of the underlying stream in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.reader.stream_position()?)
    }

    /// Seek to an absolute byte position
    pub fn seek_to(&mut self, position: u64) -> Result<()> {
        if position > self.len {
            return Err(DemoError::framing(
                position,
                format!("seek past end of file ({} bytes)", self.len),
            ));
        }
        self.reader.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    pub fn remaining(&mut self) -> Result<u64> {
        Ok(self.len.saturating_sub(self.position()?))
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn ensure_remaining(&mut self, needed: u64, what: &str) -> Result<()> {
        let position = self.position()?;
        let remaining = self.len.saturating_sub(position);
        if needed > remaining {
            return Err(DemoError::framing(
                position,
                format!("{what} needs {needed} bytes but only {remaining} remain"),
            ));
        }
        Ok(())
    }

    /// Read and validate the header. Always reads from byte zero.
    pub fn read_header(&mut self) -> Result<DemoHeader> {
        self.seek_to(0)?;
        self.ensure_remaining(HEADER_SIZE, "header")?;

        let mut stamp = [0u8; 8];
        self.reader.read_exact(&mut stamp)?;
        let demo_protocol = self.reader.read_i32::<LittleEndian>()?;
        if stamp != DEMO_HEADER_STAMP
            || !(OLDEST_DEMO_PROTOCOL..=DEMO_PROTOCOL).contains(&demo_protocol)
        {
            return Err(DemoError::ProtocolMismatch {
                found: demo_protocol,
                oldest: OLDEST_DEMO_PROTOCOL,
                current: DEMO_PROTOCOL,
            });
        }

        let network_protocol = self.reader.read_i32::<LittleEndian>()?;
        let server_name = self.read_name()?;
        let client_name = self.read_name()?;
        let map_name = self.read_name()?;
        let game_directory = self.read_name()?;
        let playback_time = self.reader.read_f32::<LittleEndian>()?;
        let playback_ticks = self.reader.read_i32::<LittleEndian>()?;
        let playback_frames = self.reader.read_i32::<LittleEndian>()?;
        let signon_length = self.reader.read_i32::<LittleEndian>()?;

        Ok(DemoHeader {
            demo_protocol,
            network_protocol,
            server_name,
            client_name,
            map_name,
            game_directory,
            playback_time,
            playback_ticks,
            playback_frames,
            signon_length,
        })
    }

    fn read_name(&mut self) -> Result<String> {
        let mut buf = [0u8; MAX_OSPATH];
        self.reader.read_exact(&mut buf)?;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(MAX_OSPATH);
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }

    /// Read the next record header.
    ///
    /// Returns `Ok(None)` when the stream ends exactly on a record boundary.
    pub fn read_command_header(&mut self) -> Result<Option<CommandHeader>> {
        let position = self.position()?;
        if position == self.len {
            return Ok(None);
        }
        self.ensure_remaining(RECORD_HEADER_SIZE, "record header")?;

        let code = self.reader.read_u8()?;
        let kind = CommandKind::from_u8(code)
            .ok_or_else(|| DemoError::framing(position, format!("unknown record kind {code}")))?;
        let tick = self.reader.read_i32::<LittleEndian>()?;
        let slot = self.reader.read_u8()?;

        Ok(Some(CommandHeader { kind, tick, slot }))
    }

    pub fn read_command_info(&mut self) -> Result<CommandInfo> {
        self.ensure_remaining(COMMAND_INFO_SIZE, "command info")?;
        let mut info = CommandInfo::default();
        for split in info.slots.iter_mut() {
            split.transition = ViewTransition::from_u32(self.reader.read_u32::<LittleEndian>()?);
            split.pose.origin = self.read_vec3()?;
            split.pose.angles = self.read_vec3()?;
            split.pose.local_angles = self.read_vec3()?;
        }
        Ok(info)
    }

    fn read_vec3(&mut self) -> Result<Vec3> {
        let x = self.reader.read_f32::<LittleEndian>()?;
        let y = self.reader.read_f32::<LittleEndian>()?;
        let z = self.reader.read_f32::<LittleEndian>()?;
        Ok(Vec3::new(x, y, z))
    }

    pub fn read_sequence_info(&mut self) -> Result<SequenceInfo> {
        self.ensure_remaining(SEQUENCE_INFO_SIZE, "sequence info")?;
        Ok(SequenceInfo {
            in_sequence: self.reader.read_i32::<LittleEndian>()?,
            out_sequence_ack: self.reader.read_i32::<LittleEndian>()?,
        })
    }

    fn read_length(&mut self) -> Result<usize> {
        self.ensure_remaining(4, "payload length")?;
        let position = self.position()?;
        let len = self.reader.read_u32::<LittleEndian>()? as u64;
        let remaining = self.len.saturating_sub(position + 4);
        if len > remaining || len > MAX_PAYLOAD_SIZE as u64 {
            return Err(DemoError::framing(
                position,
                format!("payload length {len} exceeds remaining {remaining}"),
            ));
        }
        Ok(len as usize)
    }

    /// Read a length-prefixed data block
    pub fn read_raw_data(&mut self) -> Result<Vec<u8>> {
        let len = self.read_length()?;
        let mut data = vec![0u8; len];
        self.reader.read_exact(&mut data)?;
        Ok(data)
    }

    /// Read the payload of a record whose header was just read
    pub fn read_payload(&mut self, kind: CommandKind) -> Result<RecordPayload> {
        Ok(match kind {
            CommandKind::Signon | CommandKind::Packet => {
                let info = self.read_command_info()?;
                let sequence = self.read_sequence_info()?;
                let data = self.read_raw_data()?;
                let packet = PacketData {
                    info,
                    sequence,
                    data,
                };
                if kind == CommandKind::Signon {
                    RecordPayload::Signon(packet)
                } else {
                    RecordPayload::Packet(packet)
                }
            }
            CommandKind::SyncTick => RecordPayload::SyncTick,
            CommandKind::Stop => RecordPayload::Stop,
            CommandKind::ConsoleCmd => {
                let bytes = self.read_raw_data()?;
                RecordPayload::ConsoleCmd(String::from_utf8_lossy(&bytes).into_owned())
            }
            CommandKind::UserCmd => {
                self.ensure_remaining(4, "user command sequence")?;
                let sequence = self.reader.read_i32::<LittleEndian>()?;
                let data = self.read_raw_data()?;
                RecordPayload::UserCmd { sequence, data }
            }
            CommandKind::DataTables => RecordPayload::DataTables(self.read_raw_data()?),
            CommandKind::StringTables => RecordPayload::StringTables(self.read_raw_data()?),
            CommandKind::CustomData => {
                self.ensure_remaining(4, "custom data callback")?;
                let callback = self.reader.read_i32::<LittleEndian>()?;
                let data = self.read_raw_data()?;
                RecordPayload::CustomData { callback, data }
            }
        })
    }

    /// Skip the payload of a record whose header was just read
    pub fn skip_payload(&mut self, kind: CommandKind) -> Result<()> {
        let prefix = match kind {
            CommandKind::SyncTick | CommandKind::Stop => return Ok(()),
            CommandKind::Signon | CommandKind::Packet => COMMAND_INFO_SIZE + SEQUENCE_INFO_SIZE,
            CommandKind::UserCmd | CommandKind::CustomData => 4,
            CommandKind::ConsoleCmd | CommandKind::DataTables | CommandKind::StringTables => 0,
        };
        self.ensure_remaining(prefix, kind.name())?;
        self.reader.seek(SeekFrom::Current(prefix as i64))?;
        let len = self.read_length()?;
        self.reader.seek(SeekFrom::Current(len as i64))?;
        Ok(())
    }

    /// Read one complete record, or `None` at a clean end of file
    pub fn read_record(&mut self) -> Result<Option<DemoRecord>> {
        let Some(header) = self.read_command_header()? else {
            return Ok(None);
        };
        let payload = self.read_payload(header.kind)?;
        Ok(Some(DemoRecord::new(header.tick, header.slot, payload)))
    }

    /// Walk every record after the header, counting packets and the highest tick.
    ///
    /// The caller's position is restored afterwards. A malformed tail ends the
    /// walk and is reported through [`ContainerTotals::truncated`].
    pub fn measure(&mut self) -> Result<ContainerTotals> {
        let saved = self.position()?;
        let mut totals = ContainerTotals::default();
        let walk = self.walk_records(&mut totals);
        self.seek_to(saved)?;

        match walk {
            Ok(()) => {}
            Err(e) if e.is_corruption() => {
                tracing::warn!(error = %e, records = totals.records, "Demo ends in a malformed record");
                totals.truncated = true;
            }
            Err(e) => return Err(e),
        }
        Ok(totals)
    }

    fn walk_records(&mut self, totals: &mut ContainerTotals) -> Result<()> {
        self.seek_to(HEADER_SIZE.min(self.len))?;
        while let Some(header) = self.read_command_header()? {
            self.skip_payload(header.kind)?;
            totals.records += 1;
            match header.kind {
                CommandKind::Packet => {
                    totals.packets += 1;
                    totals.highest_tick = totals.highest_tick.max(header.tick);
                }
                CommandKind::Stop => break,
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::binary::writer::DemoWriter;
    use std::io::Cursor;

    fn header() -> DemoHeader {
        DemoHeader {
            network_protocol: 13,
            server_name: "listen".to_string(),
            client_name: "alice".to_string(),
            map_name: "de_dust".to_string(),
            game_directory: "csgo".to_string(),
            ..Default::default()
        }
    }

    fn packet(tick: i32, x: f32) -> DemoRecord {
        let mut info = CommandInfo::default();
        info.slots[0].pose.origin = Vec3::new(x, 2.0, 3.0);
        info.slots[0].pose.angles = Vec3::new(10.0, 90.0, 0.0);
        DemoRecord::new(
            tick,
            0,
            RecordPayload::Packet(PacketData {
                info,
                sequence: SequenceInfo {
                    in_sequence: tick,
                    out_sequence_ack: tick - 1,
                },
                data: vec![tick as u8; 4],
            }),
        )
    }

    fn write_demo(records: &[DemoRecord]) -> Vec<u8> {
        let mut writer = DemoWriter::create(Cursor::new(Vec::new()), header()).unwrap();
        for record in records {
            writer.write_record(record).unwrap();
        }
        writer.close().unwrap();
        writer.into_inner().into_inner()
    }

    #[test]
    fn test_read_header_fields() {
        let bytes = write_demo(&[]);
        let mut reader = DemoReader::new(Cursor::new(bytes)).unwrap();
        let parsed = reader.read_header().unwrap();
        assert_eq!(parsed.map_name, "de_dust");
        assert_eq!(parsed.client_name, "alice");
        assert_eq!(parsed.network_protocol, 13);
        assert_eq!(reader.position().unwrap(), HEADER_SIZE);
    }

    #[test]
    fn test_bad_stamp_is_protocol_mismatch() {
        let mut bytes = write_demo(&[]);
        bytes[0] = b'X';
        let mut reader = DemoReader::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            reader.read_header(),
            Err(DemoError::ProtocolMismatch { .. })
        ));
    }

    #[test]
    fn test_unsupported_protocol() {
        let mut bytes = write_demo(&[]);
        bytes[8..12].copy_from_slice(&99i32.to_le_bytes());
        let mut reader = DemoReader::new(Cursor::new(bytes)).unwrap();
        match reader.read_header() {
            Err(DemoError::ProtocolMismatch { found, .. }) => assert_eq!(found, 99),
            other => panic!("Expected ProtocolMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_records_read_in_order() {
        let records = vec![
            DemoRecord::new(0, 0, RecordPayload::SyncTick),
            DemoRecord::new(0, 0, RecordPayload::ConsoleCmd("sv_cheats 1".into())),
            packet(1, 1.0),
            DemoRecord::new(
                1,
                1,
                RecordPayload::UserCmd {
                    sequence: 7,
                    data: vec![1, 2, 3],
                },
            ),
            packet(2, 2.0),
            DemoRecord::new(2, 0, RecordPayload::Stop),
        ];
        let bytes = write_demo(&records);
        let mut reader = DemoReader::new(Cursor::new(bytes)).unwrap();
        reader.read_header().unwrap();

        let mut parsed = Vec::new();
        while let Some(record) = reader.read_record().unwrap() {
            parsed.push(record);
        }
        assert_eq!(parsed, records);
    }

    #[test]
    fn test_skip_payload_keeps_framing() {
        let bytes = write_demo(&[
            packet(1, 1.0),
            DemoRecord::new(1, 0, RecordPayload::StringTables(vec![9; 32])),
            packet(2, 2.0),
        ]);
        let mut reader = DemoReader::new(Cursor::new(bytes)).unwrap();
        reader.read_header().unwrap();

        let first = reader.read_command_header().unwrap().unwrap();
        reader.skip_payload(first.kind).unwrap();
        let second = reader.read_command_header().unwrap().unwrap();
        assert_eq!(second.kind, CommandKind::StringTables);
        reader.skip_payload(second.kind).unwrap();
        let third = reader.read_record().unwrap().unwrap();
        assert_eq!(third, packet(2, 2.0));
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn test_oversized_length_is_framing_error() {
        let mut bytes = write_demo(&[DemoRecord::new(
            0,
            0,
            RecordPayload::ConsoleCmd("echo".into()),
        )]);
        let len_offset = (HEADER_SIZE + RECORD_HEADER_SIZE) as usize;
        bytes[len_offset..len_offset + 4].copy_from_slice(&1000u32.to_le_bytes());

        let mut reader = DemoReader::new(Cursor::new(bytes)).unwrap();
        reader.read_header().unwrap();
        let header = reader.read_command_header().unwrap().unwrap();
        assert!(matches!(
            reader.read_payload(header.kind),
            Err(DemoError::Framing { .. })
        ));
    }

    #[test]
    fn test_truncated_record_header() {
        let mut bytes = write_demo(&[packet(1, 1.0)]);
        bytes.extend_from_slice(&[CommandKind::Packet as u8, 5]);
        let mut reader = DemoReader::new(Cursor::new(bytes)).unwrap();
        reader.read_header().unwrap();
        reader.read_record().unwrap().unwrap();
        assert!(matches!(
            reader.read_record(),
            Err(DemoError::Framing { .. })
        ));
    }

    #[test]
    fn test_unknown_kind() {
        let mut bytes = write_demo(&[]);
        bytes.extend_from_slice(&[42, 0, 0, 0, 0, 0]);
        let mut reader = DemoReader::new(Cursor::new(bytes)).unwrap();
        reader.read_header().unwrap();
        assert!(matches!(
            reader.read_command_header(),
            Err(DemoError::Framing { .. })
        ));
    }

    #[test]
    fn test_measure_restores_position() {
        let records: Vec<_> = (1..=20).map(|t| packet(t, t as f32)).collect();
        let bytes = write_demo(&records);
        let mut reader = DemoReader::new(Cursor::new(bytes)).unwrap();
        reader.read_header().unwrap();
        reader.read_record().unwrap();
        let before = reader.position().unwrap();

        let totals = reader.measure().unwrap();
        assert_eq!(totals.packets, 20);
        assert_eq!(totals.highest_tick, 20);
        assert_eq!(totals.records, 20);
        assert!(!totals.truncated);
        assert_eq!(reader.position().unwrap(), before);
    }

    #[test]
    fn test_measure_tolerates_truncated_tail() {
        let records: Vec<_> = (1..=5).map(|t| packet(t, t as f32)).collect();
        let mut bytes = write_demo(&records);
        bytes.truncate(bytes.len() - 3);
        let mut reader = DemoReader::new(Cursor::new(bytes)).unwrap();
        let totals = reader.measure().unwrap();
        assert_eq!(totals.packets, 4);
        assert!(totals.truncated);
    }
}
