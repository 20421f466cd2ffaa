//! String table snapshots
//!
//! A [`StringTableSet`] is a value copy of the server-published string tables.
//! Snapshots are written into `stringtables` records and the scanner works on
//! its own copy, never on the client's live tables.
//!
//! Encoding (little-endian):
//!
//! ```text
//! table_count: u16
//! per table:  name_len: u16, name, entry_count: u32
//! per entry:  key_len: u16, key, value_len: u32, value
//! ```

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{DemoError, Result};

/// Name of the table holding per-player user info
pub const USERINFO_TABLE: &str = "userinfo";

/// One named table of key/value entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTable {
    entries: BTreeMap<String, Vec<u8>>,
}

impl StringTable {
    pub fn set(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All string tables at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTableSet {
    tables: BTreeMap<String, StringTable>,
}

impl StringTableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&StringTable> {
        self.tables.get(name)
    }

    pub fn table_mut(&mut self, name: &str) -> &mut StringTable {
        self.tables.entry(name.to_string()).or_default()
    }

    /// Apply an incremental update to one table
    pub fn apply_update<'a>(
        &mut self,
        table: &str,
        entries: impl IntoIterator<Item = (&'a str, &'a [u8])>,
    ) {
        let target = self.table_mut(table);
        for (key, value) in entries {
            target.set(key, value.to_vec());
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // Writes into a Vec cannot fail
        let _ = self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) -> std::io::Result<()> {
        out.write_u16::<LittleEndian>(self.tables.len() as u16)?;
        for (name, table) in &self.tables {
            write_str(out, name)?;
            out.write_u32::<LittleEndian>(table.entries.len() as u32)?;
            for (key, value) in &table.entries {
                write_str(out, key)?;
                out.write_u32::<LittleEndian>(value.len() as u32)?;
                out.extend_from_slice(value);
            }
        }
        Ok(())
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Self::read_from(&mut cursor).map_err(|e| DemoError::Decode(format!("string tables: {e}")))
    }

    fn read_from(cursor: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        let mut set = Self::new();
        let table_count = cursor.read_u16::<LittleEndian>()?;
        for _ in 0..table_count {
            let name = read_str(cursor)?;
            let entry_count = cursor.read_u32::<LittleEndian>()?;
            let table = set.table_mut(&name);
            for _ in 0..entry_count {
                let key = read_str(cursor)?;
                let len = cursor.read_u32::<LittleEndian>()? as usize;
                let value = read_bytes(cursor, len)?;
                table.set(key, value);
            }
        }
        Ok(set)
    }
}

/// Encode the custom-data callback name table.
///
/// Layout: `count: i32` (little-endian) followed by nul-terminated names.
pub fn encode_callback_table(names: &[String]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + names.iter().map(|n| n.len() + 1).sum::<usize>());
    out.extend_from_slice(&(names.len() as i32).to_le_bytes());
    for name in names {
        out.extend_from_slice(name.as_bytes());
        out.push(0);
    }
    out
}

pub fn decode_callback_table(data: &[u8]) -> Result<Vec<String>> {
    let mut cursor = Cursor::new(data);
    let count = cursor
        .read_i32::<LittleEndian>()
        .map_err(|e| DemoError::Decode(format!("callback table: {e}")))?;
    let mut rest = &data[4..];
    let mut names = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count.max(0) {
        let Some(end) = rest.iter().position(|&b| b == 0) else {
            return Err(DemoError::Decode(format!(
                "callback table: expected {count} names, found {}",
                names.len()
            )));
        };
        names.push(String::from_utf8_lossy(&rest[..end]).into_owned());
        rest = &rest[end + 1..];
    }
    Ok(names)
}

fn write_str(out: &mut Vec<u8>, s: &str) -> std::io::Result<()> {
    out.write_u16::<LittleEndian>(s.len() as u16)?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

pub(crate) fn read_bytes(cursor: &mut Cursor<&[u8]>, len: usize) -> std::io::Result<Vec<u8>> {
    let remaining = (cursor.get_ref().len() as u64).saturating_sub(cursor.position());
    if len as u64 > remaining {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("length {len} exceeds remaining {remaining}"),
        ));
    }
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_str(cursor: &mut Cursor<&[u8]>) -> std::io::Result<String> {
    let len = cursor.read_u16::<LittleEndian>()? as usize;
    let bytes = read_bytes(cursor, len)?;
    String::from_utf8(bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let mut set = StringTableSet::new();
        set.table_mut(USERINFO_TABLE).set("0", vec![1, 2, 3]);
        set.table_mut("modelprecache").set("models/a.mdl", Vec::new());

        let decoded = StringTableSet::decode(&set.encode()).unwrap();
        assert_eq!(decoded, set);
        assert_eq!(
            decoded.table(USERINFO_TABLE).unwrap().get("0"),
            Some(&[1u8, 2, 3][..])
        );
    }

    #[test]
    fn test_copy_is_isolated() {
        let mut live = StringTableSet::new();
        live.table_mut(USERINFO_TABLE).set("0", vec![1]);

        let mut copy = live.clone();
        copy.apply_update(USERINFO_TABLE, [("0", &[9u8][..]), ("1", &[2u8][..])]);

        assert_eq!(live.table(USERINFO_TABLE).unwrap().get("0"), Some(&[1u8][..]));
        assert_eq!(live.table(USERINFO_TABLE).unwrap().len(), 1);
        assert_eq!(copy.table(USERINFO_TABLE).unwrap().len(), 2);
    }

    #[test]
    fn test_decode_truncated() {
        let mut set = StringTableSet::new();
        set.table_mut("t").set("k", vec![0; 10]);
        let bytes = set.encode();
        assert!(matches!(
            StringTableSet::decode(&bytes[..bytes.len() - 2]),
            Err(DemoError::Decode(_))
        ));
    }

    #[test]
    fn test_callback_table() {
        let names = vec!["ragdoll".to_string(), "decals".to_string()];
        let bytes = encode_callback_table(&names);
        assert_eq!(&bytes[..4], &2i32.to_le_bytes());
        assert_eq!(&bytes[4..], b"ragdoll\0decals\0");
        assert_eq!(decode_callback_table(&bytes).unwrap(), names);

        assert!(decode_callback_table(&bytes[..bytes.len() - 1]).is_err());
        assert!(decode_callback_table(&[1, 0]).is_err());
    }
}
