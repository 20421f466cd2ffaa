//! Event vocabulary and the important-event descriptor table
//!
//! The scanner knows nothing about a particular game's events. Numeric ids
//! and key schemas come from an [`EventSource`]; which events are "important"
//! comes from an [`ImportantEventTable`] loaded from TOML.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::{DemoError, Result};

/// Value of one event key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Bool(bool),
    Int(i32),
    U64(u64),
    Float(f32),
    Str(String),
}

impl EventValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::U64(v) => Some(*v as f64),
            Self::Float(v) => Some(*v as f64),
            Self::Bool(_) | Self::Str(_) => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            Self::U64(v) => i32::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            Self::Str(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

/// Declared type of an event key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventValueKind {
    Bool,
    Int,
    U64,
    Float,
    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventKeyDef {
    pub name: String,
    pub kind: EventValueKind,
}

/// An event name resolved to its wire id and key schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub id: i32,
    pub name: String,
    pub keys: Vec<EventKeyDef>,
}

/// Resolves event names and ids
pub trait EventSource {
    fn resolve(&self, name: &str) -> Option<&EventDescriptor>;
    fn descriptor(&self, id: i32) -> Option<&EventDescriptor>;
}

/// Ordered key/value payload parsed from one event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventKeys {
    entries: Vec<(String, EventValue)>,
}

impl EventKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&EventValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(EventValue::as_u64)
    }

    /// Insert or replace, keeping the original position of existing keys
    pub fn set(&mut self, key: impl Into<String>, value: EventValue) {
        let key = key.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EventValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any `*_xuid` key equals `xuid`
    pub fn mentions(&self, xuid: u64) -> bool {
        self.entries
            .iter()
            .any(|(k, v)| k.ends_with("_xuid") && v.as_u64() == Some(xuid))
    }
}

impl Serialize for EventKeys {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(k, v)| (k, v)))
    }
}

impl<K: Into<String>> FromIterator<(K, EventValue)> for EventKeys {
    fn from_iter<I: IntoIterator<Item = (K, EventValue)>>(iter: I) -> Self {
        let mut keys = Self::new();
        for (k, v) in iter {
            keys.set(k, v);
        }
        keys
    }
}

/// One row of the important-event table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportantEvent {
    #[serde(skip)]
    pub name: String,
    /// Display name
    #[serde(default)]
    pub uiname: String,
    /// Seconds before the event a seek should land
    #[serde(default)]
    pub seek_time_before: f32,
    #[serde(default)]
    pub seek_back_offset: f32,
    #[serde(default)]
    pub seek_forward_offset: f32,
    /// Aggregated by pattern scans but never indexed
    #[serde(default, rename = "scanonly")]
    pub scan_only: bool,
    /// Event key holding a user id, mapped to the role prefix used for
    /// roster annotations
    #[serde(default = "default_user_keys")]
    pub user_keys: BTreeMap<String, String>,
}

fn default_user_keys() -> BTreeMap<String, String> {
    BTreeMap::from([("userid".to_string(), "player".to_string())])
}

impl ImportantEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uiname: String::new(),
            seek_time_before: 0.0,
            seek_back_offset: 0.0,
            seek_forward_offset: 0.0,
            scan_only: false,
            user_keys: default_user_keys(),
        }
    }

    pub fn display_name(&self) -> &str {
        if self.uiname.is_empty() {
            &self.name
        } else {
            &self.uiname
        }
    }
}

/// The important-event descriptor table, immutable during a scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportantEventTable {
    events: Vec<ImportantEvent>,
}

impl ImportantEventTable {
    pub fn new(events: Vec<ImportantEvent>) -> Self {
        Self { events }
    }

    /// Parse `[event_name]` tables from TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let parsed: BTreeMap<String, ImportantEvent> =
            toml::from_str(content).map_err(|e| DemoError::Config(e.to_string()))?;
        let events = parsed
            .into_iter()
            .map(|(name, mut event)| {
                event.name = name;
                event
            })
            .collect();
        Ok(Self { events })
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| DemoError::Config(format!("{}: {e}", path.display())))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.events
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, index: usize) -> Option<&ImportantEvent> {
        self.events.get(index)
    }

    pub fn by_name(&self, name: &str) -> Option<&ImportantEvent> {
        self.index_of(name).and_then(|i| self.events.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImportantEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
