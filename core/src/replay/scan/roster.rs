//! Player roster built from the `userinfo` string table
//!
//! Each entry is a big-endian encoded [`PlayerInfo`]:
//!
//! ```text
//! xuid: u64, user_id: i32, name_len: u16, name
//! ```

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use hashbrown::HashMap;

use super::events::{EventKeys, EventValue};
use crate::error::{DemoError, Result};
use crate::replay::tables::{StringTable, read_bytes};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub xuid: u64,
    pub user_id: i32,
    pub name: String,
}

impl PlayerInfo {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(14 + self.name.len());
        // Writes into a Vec cannot fail
        let _ = out
            .write_u64::<BigEndian>(self.xuid)
            .and_then(|_| out.write_i32::<BigEndian>(self.user_id))
            .and_then(|_| out.write_u16::<BigEndian>(self.name.len() as u16));
        out.extend_from_slice(self.name.as_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let parse = |cursor: &mut Cursor<&[u8]>| -> std::io::Result<Self> {
            let xuid = cursor.read_u64::<BigEndian>()?;
            let user_id = cursor.read_i32::<BigEndian>()?;
            let len = cursor.read_u16::<BigEndian>()? as usize;
            let name = String::from_utf8_lossy(&read_bytes(cursor, len)?).into_owned();
            Ok(Self {
                xuid,
                user_id,
                name,
            })
        };
        parse(&mut cursor).map_err(|e| DemoError::Decode(format!("player info: {e}")))
    }
}

/// Players currently connected, keyed by table entry
#[derive(Debug, Clone, Default)]
pub struct Roster {
    by_entry: HashMap<String, PlayerInfo>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a full `userinfo` table
    pub fn from_table(table: Option<&StringTable>) -> Self {
        let mut roster = Self::new();
        if let Some(table) = table {
            for (key, value) in table.iter() {
                roster.update(key, value);
            }
        }
        roster
    }

    /// Apply one table entry. Empty or undecodable values remove the player.
    pub fn update(&mut self, entry: &str, value: &[u8]) {
        if value.is_empty() {
            self.by_entry.remove(entry);
            return;
        }
        match PlayerInfo::decode(value) {
            Ok(info) => {
                self.by_entry.insert(entry.to_string(), info);
            }
            Err(e) => {
                tracing::debug!(entry, error = %e, "Ignoring malformed userinfo entry");
                self.by_entry.remove(entry);
            }
        }
    }

    pub fn by_user_id(&self, user_id: i32) -> Option<&PlayerInfo> {
        self.by_entry.values().find(|p| p.user_id == user_id)
    }

    pub fn len(&self) -> usize {
        self.by_entry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entry.is_empty()
    }

    /// Add `<role>_name` and `<role>_xuid` for every user-id key that resolves
    pub fn annotate<'a>(
        &self,
        keys: &mut EventKeys,
        user_keys: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) {
        for (key, role) in user_keys {
            let Some(user_id) = keys.get(key).and_then(EventValue::as_i32) else {
                continue;
            };
            if let Some(player) = self.by_user_id(user_id) {
                keys.set(format!("{role}_name"), EventValue::Str(player.name.clone()));
                keys.set(format!("{role}_xuid"), EventValue::U64(player.xuid));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn alice() -> PlayerInfo {
        PlayerInfo {
            xuid: 76561198000000001,
            user_id: 3,
            name: "alice".into(),
        }
    }

    #[test]
    fn test_player_info_is_big_endian() {
        let bytes = alice().encode();
        assert_eq!(&bytes[..8], &76561198000000001u64.to_be_bytes());
        assert_eq!(&bytes[8..12], &3i32.to_be_bytes());
        assert_eq!(PlayerInfo::decode(&bytes).unwrap(), alice());
    }

    #[test]
    fn test_update_and_remove() {
        let mut roster = Roster::new();
        roster.update("0", &alice().encode());
        assert_eq!(roster.by_user_id(3).unwrap().name, "alice");

        roster.update("0", &[]);
        assert!(roster.is_empty());

        roster.update("1", &[1, 2]);
        assert!(roster.by_user_id(3).is_none());
    }

    #[test]
    fn test_annotate_roles() {
        let mut roster = Roster::new();
        roster.update("0", &alice().encode());
        roster.update(
            "1",
            &PlayerInfo {
                xuid: 42,
                user_id: 5,
                name: "bob".into(),
            }
            .encode(),
        );

        let mut keys: EventKeys = [
            ("userid", EventValue::Int(5)),
            ("attacker", EventValue::Int(3)),
            ("assister", EventValue::Int(99)),
        ]
        .into_iter()
        .collect();
        let user_keys = BTreeMap::from([
            ("userid".to_string(), "victim".to_string()),
            ("attacker".to_string(), "attacker".to_string()),
            ("assister".to_string(), "assister".to_string()),
        ]);
        roster.annotate(&mut keys, &user_keys);

        assert_eq!(keys.get("victim_name"), Some(&EventValue::Str("bob".into())));
        assert_eq!(keys.get_u64("victim_xuid"), Some(42));
        assert_eq!(keys.get_u64("attacker_xuid"), Some(76561198000000001));
        assert!(keys.get("assister_xuid").is_none());
    }
}
