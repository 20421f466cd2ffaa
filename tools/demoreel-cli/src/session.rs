//! Shared command state: configuration, file stores and event schemas

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use demoreel_core::OsFileStore;
use demoreel_core::config::{self, DemoConfig};
use demoreel_core::replay::scan::{BasicNetCodec, EventKeyDef, ImportantEventTable};
use serde::{Deserialize, Serialize};

/// State shared by every command
pub struct Session {
    pub config: DemoConfig,
    pub json: bool,
}

impl Session {
    pub fn new(config_path: Option<&Path>, json: bool) -> Result<Self> {
        let config = match config_path {
            Some(path) => config::load_from(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => config::load(),
        };
        Ok(Self { config, json })
    }

    /// Print `report` as pretty JSON
    pub fn print_json<T: Serialize>(&self, report: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(report)?);
        Ok(())
    }
}

/// Store rooted at the demo's directory plus the demo's name inside it
pub fn demo_store(demo: &Path) -> Result<(OsFileStore, PathBuf)> {
    let name = demo
        .file_name()
        .with_context(|| format!("Not a demo file: {}", demo.display()))?;
    let root = match demo.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((OsFileStore::new(root), PathBuf::from(name)))
}

pub fn load_events(path: &Path) -> Result<ImportantEventTable> {
    let events = ImportantEventTable::load_from(path)
        .with_context(|| format!("Failed to load important events: {}", path.display()))?;
    tracing::debug!(path = %path.display(), events = events.len(), "Loaded important events");
    Ok(events)
}

/// Game event schema file.
///
/// ```toml
/// [[event]]
/// name = "player_death"
/// keys = [
///     { name = "userid", kind = "int" },
///     { name = "attacker", kind = "int" },
/// ]
/// ```
///
/// Event ids follow file order, starting at zero.
#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default, rename = "event")]
    events: Vec<EventSchema>,
}

#[derive(Debug, Deserialize)]
struct EventSchema {
    name: String,
    #[serde(default)]
    keys: Vec<EventKeyDef>,
}

pub fn codec_from_toml(content: &str) -> Result<BasicNetCodec> {
    let schema: SchemaFile = toml::from_str(content).context("Invalid event schema")?;
    let mut codec = BasicNetCodec::new();
    for event in &schema.events {
        let keys: Vec<_> = event
            .keys
            .iter()
            .map(|key| (key.name.as_str(), key.kind))
            .collect();
        codec.register(&event.name, &keys);
    }
    Ok(codec)
}

pub fn load_codec(path: &Path) -> Result<BasicNetCodec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read event schema: {}", path.display()))?;
    codec_from_toml(&content).with_context(|| format!("In {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use demoreel_core::replay::scan::{EventSource, EventValueKind};

    #[test]
    fn test_codec_from_toml_keeps_key_order() {
        let codec = codec_from_toml(
            r#"
[[event]]
name = "player_death"
keys = [
    { name = "userid", kind = "int" },
    { name = "attacker", kind = "int" },
    { name = "headshot", kind = "bool" },
]

[[event]]
name = "round_end"
"#,
        )
        .unwrap();

        let death = codec.resolve("player_death").unwrap();
        assert_eq!(death.id, 0);
        let names: Vec<_> = death.keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, ["userid", "attacker", "headshot"]);
        assert_eq!(death.keys[2].kind, EventValueKind::Bool);
        assert_eq!(codec.resolve("round_end").unwrap().id, 1);
    }

    #[test]
    fn test_codec_rejects_unknown_kind() {
        let result = codec_from_toml(
            r#"
[[event]]
name = "bad"
keys = [{ name = "x", kind = "vector" }]
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_demo_store_splits_path() {
        let (store, name) = demo_store(Path::new("demos/match.dem")).unwrap();
        assert_eq!(store.root(), Path::new("demos"));
        assert_eq!(name, PathBuf::from("match.dem"));

        let (store, _) = demo_store(Path::new("match.dem")).unwrap();
        assert_eq!(store.root(), Path::new("."));
    }
}
