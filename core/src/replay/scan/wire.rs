//! Network payload messages seen by the scanner
//!
//! Real deployments plug in their own [`MessageDecoder`]. [`BasicNetCodec`]
//! is a small reference protocol used by the CLI and tests.
//!
//! Reference framing (little-endian), repeated until the payload ends:
//!
//! ```text
//! kind: u8, len: u32, body[len]
//!   kind 1 game event:   id: i32, count: u16, tagged values
//!   kind 2 table update: table: str16, count: u16, (key: str16, value: u32 len + bytes)*
//! ```

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use hashbrown::HashMap;
use smallvec::SmallVec;

use super::events::{EventDescriptor, EventKeyDef, EventSource, EventValue, EventValueKind};
use crate::error::{DemoError, Result};
use crate::replay::tables::read_bytes;

const MSG_GAME_EVENT: u8 = 1;
const MSG_UPDATE_STRING_TABLE: u8 = 2;

/// One message embedded in a network payload
#[derive(Debug, Clone, PartialEq)]
pub enum NetMessage {
    /// Values are in the order of the descriptor's key schema
    GameEvent { id: i32, values: Vec<EventValue> },
    UpdateStringTable {
        table: String,
        entries: Vec<(String, Vec<u8>)>,
    },
    Other { kind: u8, data: Vec<u8> },
}

pub type NetMessages = SmallVec<[NetMessage; 4]>;

/// Splits a network payload into messages
pub trait MessageDecoder {
    fn decode(&self, payload: &[u8]) -> Result<NetMessages>;
}

/// Reference codec: an in-memory event registry plus the framing above
#[derive(Debug, Clone, Default)]
pub struct BasicNetCodec {
    descriptors: Vec<EventDescriptor>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<i32, usize>,
}

impl BasicNetCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event and return its id. Re-registering returns the old id.
    pub fn register(&mut self, name: &str, keys: &[(&str, EventValueKind)]) -> i32 {
        let lookup = name.to_ascii_lowercase();
        if let Some(&index) = self.by_name.get(&lookup) {
            return self.descriptors[index].id;
        }
        let id = self.descriptors.len() as i32;
        let index = self.descriptors.len();
        self.descriptors.push(EventDescriptor {
            id,
            name: name.to_string(),
            keys: keys
                .iter()
                .map(|(key, kind)| EventKeyDef {
                    name: key.to_string(),
                    kind: *kind,
                })
                .collect(),
        });
        self.by_name.insert(lookup, index);
        self.by_id.insert(id, index);
        id
    }

    /// Build a game event message, ordering `values` by the key schema.
    ///
    /// Keys missing from `values` get a zero value of their declared kind.
    pub fn game_event(&self, name: &str, values: &[(&str, EventValue)]) -> Option<NetMessage> {
        let descriptor = self.resolve(name)?;
        let ordered = descriptor
            .keys
            .iter()
            .map(|key| {
                values
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(&key.name))
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| zero_value(key.kind))
            })
            .collect();
        Some(NetMessage::GameEvent {
            id: descriptor.id,
            values: ordered,
        })
    }

    /// Encode messages into one payload.
    ///
    /// Strings and element counts carry u16 lengths: longer strings are cut
    /// at the last char boundary that fits, and lists keep their first
    /// `u16::MAX` elements.
    pub fn encode(messages: &[NetMessage]) -> Vec<u8> {
        let mut out = Vec::new();
        for message in messages {
            let (kind, body) = match message {
                NetMessage::GameEvent { id, values } => {
                    let mut body = Vec::new();
                    body.extend_from_slice(&id.to_le_bytes());
                    let count = clamped_len(values.len());
                    body.extend_from_slice(&count.to_le_bytes());
                    for value in &values[..count as usize] {
                        write_value(&mut body, value);
                    }
                    (MSG_GAME_EVENT, body)
                }
                NetMessage::UpdateStringTable { table, entries } => {
                    let mut body = Vec::new();
                    write_str(&mut body, table);
                    let count = clamped_len(entries.len());
                    body.extend_from_slice(&count.to_le_bytes());
                    for (key, value) in &entries[..count as usize] {
                        write_str(&mut body, key);
                        body.extend_from_slice(&(value.len() as u32).to_le_bytes());
                        body.extend_from_slice(value);
                    }
                    (MSG_UPDATE_STRING_TABLE, body)
                }
                NetMessage::Other { kind, data } => (*kind, data.clone()),
            };
            out.push(kind);
            out.extend_from_slice(&(body.len() as u32).to_le_bytes());
            out.extend_from_slice(&body);
        }
        out
    }
}

impl EventSource for BasicNetCodec {
    fn resolve(&self, name: &str) -> Option<&EventDescriptor> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|&i| &self.descriptors[i])
    }

    fn descriptor(&self, id: i32) -> Option<&EventDescriptor> {
        self.by_id.get(&id).map(|&i| &self.descriptors[i])
    }
}

impl MessageDecoder for BasicNetCodec {
    fn decode(&self, payload: &[u8]) -> Result<NetMessages> {
        let mut cursor = Cursor::new(payload);
        let mut messages = NetMessages::new();
        while (cursor.position() as usize) < payload.len() {
            let message =
                read_message(&mut cursor).map_err(|e| DemoError::Decode(e.to_string()))?;
            messages.push(message);
        }
        Ok(messages)
    }
}

fn zero_value(kind: EventValueKind) -> EventValue {
    match kind {
        EventValueKind::Bool => EventValue::Bool(false),
        EventValueKind::Int => EventValue::Int(0),
        EventValueKind::U64 => EventValue::U64(0),
        EventValueKind::Float => EventValue::Float(0.0),
        EventValueKind::String => EventValue::Str(String::new()),
    }
}

fn clamped_len(len: usize) -> u16 {
    u16::try_from(len).unwrap_or(u16::MAX)
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    let mut end = clamped_len(s.len()) as usize;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    out.extend_from_slice(&(end as u16).to_le_bytes());
    out.extend_from_slice(&s.as_bytes()[..end]);
}

fn write_value(out: &mut Vec<u8>, value: &EventValue) {
    // Writes into a Vec cannot fail
    let _ = match value {
        EventValue::Bool(v) => out.write_u8(0).and_then(|_| out.write_u8(*v as u8)),
        EventValue::Int(v) => out.write_u8(1).and_then(|_| out.write_i32::<LittleEndian>(*v)),
        EventValue::U64(v) => out.write_u8(2).and_then(|_| out.write_u64::<LittleEndian>(*v)),
        EventValue::Float(v) => out.write_u8(3).and_then(|_| out.write_f32::<LittleEndian>(*v)),
        EventValue::Str(v) => {
            out.push(4);
            write_str(out, v);
            Ok(())
        }
    };
}

fn read_str(cursor: &mut Cursor<&[u8]>) -> std::io::Result<String> {
    let len = cursor.read_u16::<LittleEndian>()? as usize;
    let bytes = read_bytes(cursor, len)?;
    String::from_utf8(bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn read_value(cursor: &mut Cursor<&[u8]>) -> std::io::Result<EventValue> {
    Ok(match cursor.read_u8()? {
        0 => EventValue::Bool(cursor.read_u8()? != 0),
        1 => EventValue::Int(cursor.read_i32::<LittleEndian>()?),
        2 => EventValue::U64(cursor.read_u64::<LittleEndian>()?),
        3 => EventValue::Float(cursor.read_f32::<LittleEndian>()?),
        4 => EventValue::Str(read_str(cursor)?),
        tag => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown value tag {tag}"),
            ));
        }
    })
}

fn read_message(cursor: &mut Cursor<&[u8]>) -> std::io::Result<NetMessage> {
    let kind = cursor.read_u8()?;
    let len = cursor.read_u32::<LittleEndian>()? as usize;
    let body = read_bytes(cursor, len)?;
    let mut body_cursor = Cursor::new(body.as_slice());

    Ok(match kind {
        MSG_GAME_EVENT => {
            let id = body_cursor.read_i32::<LittleEndian>()?;
            let count = body_cursor.read_u16::<LittleEndian>()?;
            let values = (0..count)
                .map(|_| read_value(&mut body_cursor))
                .collect::<std::io::Result<Vec<_>>>()?;
            NetMessage::GameEvent { id, values }
        }
        MSG_UPDATE_STRING_TABLE => {
            let table = read_str(&mut body_cursor)?;
            let count = body_cursor.read_u16::<LittleEndian>()?;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let key = read_str(&mut body_cursor)?;
                let len = body_cursor.read_u32::<LittleEndian>()? as usize;
                entries.push((key, read_bytes(&mut body_cursor, len)?));
            }
            NetMessage::UpdateStringTable { table, entries }
        }
        _ => {
            let mut data = Vec::new();
            body_cursor.read_to_end(&mut data)?;
            NetMessage::Other { kind, data }
        }
    })
}
