//! Importance scanner
//!
//! A second read pass over a container that indexes notable events. The pass
//! works on a private copy of the string tables and restores the reader's
//! position when it finishes, so it can run against a reader that is also
//! used for playback.

use std::io::{Read, Seek};

use serde::Serialize;

use super::events::{EventKeys, EventSource, EventValue, ImportantEventTable};
use super::roster::Roster;
use super::wire::{MessageDecoder, NetMessage};
use crate::error::Result;
use crate::replay::binary::DemoReader;
use crate::replay::tables::{StringTableSet, USERINFO_TABLE};
use crate::replay::types::{CommandKind, ContainerTotals, DemoHeader, RecordPayload};

/// One indexed event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportantTick {
    pub tick: i32,
    /// Tick of the packet before the one carrying the event
    pub previous_tick: i32,
    /// Index into the [`ImportantEventTable`]
    pub event_index: usize,
    pub keys: EventKeys,
}

/// Ordered important ticks with lookup helpers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportantTickIndex {
    ticks: Vec<ImportantTick>,
    #[serde(skip)]
    names: Vec<String>,
}

impl ImportantTickIndex {
    pub(crate) fn new(ticks: Vec<ImportantTick>, table: &ImportantEventTable) -> Self {
        Self {
            ticks,
            names: table.iter().map(|e| e.name.clone()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ImportantTick> {
        self.ticks.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImportantTick> {
        self.ticks.iter()
    }

    /// Event name of an entry
    pub fn event_name(&self, entry: &ImportantTick) -> &str {
        self.names
            .get(entry.event_index)
            .map(String::as_str)
            .unwrap_or("")
    }

    fn matches(&self, entry: &ImportantTick, event: Option<&str>) -> bool {
        event.is_none_or(|name| self.event_name(entry).eq_ignore_ascii_case(name))
    }

    /// First entry strictly after `tick`
    pub fn find_next(&self, tick: i32, event: Option<&str>) -> Option<usize> {
        self.ticks
            .iter()
            .position(|t| t.tick > tick && self.matches(t, event))
    }

    /// Last entry strictly before `tick`
    pub fn find_previous(&self, tick: i32, event: Option<&str>) -> Option<usize> {
        self.ticks
            .iter()
            .rposition(|t| t.tick < tick && self.matches(t, event))
    }

    /// First entry at or after `tick` that mentions `xuid`
    pub fn find_next_by_subject(&self, tick: i32, xuid: u64) -> Option<usize> {
        self.ticks
            .iter()
            .position(|t| t.tick >= tick && t.keys.mentions(xuid))
    }

    pub fn find_next_by_subject_and_event(
        &self,
        tick: i32,
        xuid: u64,
        event: &str,
    ) -> Option<usize> {
        self.ticks.iter().position(|t| {
            t.tick > tick && t.keys.mentions(xuid) && self.matches(t, Some(event))
        })
    }

    pub fn find_previous_by_subject_and_event(
        &self,
        tick: i32,
        xuid: u64,
        event: &str,
    ) -> Option<usize> {
        self.ticks.iter().rposition(|t| {
            t.tick < tick && t.keys.mentions(xuid) && self.matches(t, Some(event))
        })
    }

    /// Human-readable listing, one line per entry
    pub fn describe(&self, table: &ImportantEventTable) -> Vec<String> {
        self.ticks
            .iter()
            .map(|t| {
                let label = table
                    .get(t.event_index)
                    .map(|e| e.display_name().to_string())
                    .unwrap_or_default();
                let keys: Vec<String> = t.keys.iter().map(|(k, v)| format!("{k}={v}")).collect();
                format!("tick {:>7} (prev {:>7}) {} {}", t.tick, t.previous_tick, label, keys.join(" "))
            })
            .collect()
    }
}

/// Aggregate of every occurrence of one event, including scan-only events
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatternStats {
    pub event: String,
    pub occurrences: u32,
    pub first_tick: Option<i32>,
    pub last_tick: Option<i32>,
    /// Largest value seen for each numeric key
    pub maxima: Vec<(String, f64)>,
}

impl PatternStats {
    fn new(event: &str) -> Self {
        Self {
            event: event.to_string(),
            ..Default::default()
        }
    }

    fn fold(&mut self, tick: i32, keys: &EventKeys) {
        self.occurrences += 1;
        self.first_tick.get_or_insert(tick);
        self.last_tick = Some(tick);
        for (key, value) in keys.iter() {
            let Some(v) = value.as_f64() else { continue };
            match self.maxima.iter_mut().find(|(k, _)| k == key) {
                Some((_, max)) => *max = max.max(v),
                None => self.maxima.push((key.to_string(), v)),
            }
        }
    }
}

/// Result of one scan pass
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub header: DemoHeader,
    pub index: ImportantTickIndex,
    pub pattern: Option<PatternStats>,
    pub packets: i32,
    pub highest_tick: i32,
    /// The header trailer was rewritten from observed totals
    pub healed: bool,
    /// The trailer is still unusable after the scan
    pub incomplete: bool,
}

/// Scanner configuration borrowed for one pass
pub struct ImportanceScanner<'a> {
    events: &'a ImportantEventTable,
    source: &'a dyn EventSource,
    decoder: &'a dyn MessageDecoder,
    strict: bool,
    tick_interval: f32,
}

struct ResolvedEvent {
    table_index: usize,
    id: i32,
}

impl<'a> ImportanceScanner<'a> {
    pub fn new(
        events: &'a ImportantEventTable,
        source: &'a dyn EventSource,
        decoder: &'a dyn MessageDecoder,
    ) -> Self {
        Self {
            events,
            source,
            decoder,
            strict: false,
            tick_interval: 1.0 / 64.0,
        }
    }

    /// Never heal incomplete headers
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Tick interval used when healing a header with no usable trailer
    pub fn tick_interval(mut self, interval: f32) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn events(&self) -> &ImportantEventTable {
        self.events
    }

    /// Scan the whole container.
    ///
    /// `initial_tables` is copied, never mutated. `pattern` names one event to
    /// aggregate. The reader's position is restored even if the scan fails.
    pub fn scan<R: Read + Seek>(
        &self,
        reader: &mut DemoReader<R>,
        initial_tables: Option<&StringTableSet>,
        pattern: Option<&str>,
    ) -> Result<ScanReport> {
        let saved = reader.position()?;
        let result = self.scan_from_start(reader, initial_tables, pattern);
        reader.seek_to(saved)?;
        result
    }

    fn resolve_events(&self) -> Vec<ResolvedEvent> {
        self.events
            .iter()
            .enumerate()
            .filter_map(|(table_index, event)| match self.source.resolve(&event.name) {
                Some(descriptor) => Some(ResolvedEvent {
                    table_index,
                    id: descriptor.id,
                }),
                None => {
                    tracing::debug!(event = %event.name, "Important event not known to event source");
                    None
                }
            })
            .collect()
    }

    fn scan_from_start<R: Read + Seek>(
        &self,
        reader: &mut DemoReader<R>,
        initial_tables: Option<&StringTableSet>,
        pattern: Option<&str>,
    ) -> Result<ScanReport> {
        let mut header = reader.read_header()?;
        let resolved = self.resolve_events();

        let mut tables = initial_tables.cloned().unwrap_or_default();
        let mut roster = Roster::from_table(tables.table(USERINFO_TABLE));
        let mut stats = pattern.map(PatternStats::new);

        let mut ticks = Vec::new();
        let mut packets = 0;
        let mut highest_tick = 0;
        let mut previous_tick = 0;

        while let Some(command) = reader.read_command_header()? {
            match command.kind {
                CommandKind::Packet | CommandKind::Signon => {
                    let (RecordPayload::Packet(packet) | RecordPayload::Signon(packet)) =
                        reader.read_payload(command.kind)?
                    else {
                        continue;
                    };
                    if command.kind == CommandKind::Packet {
                        packets += 1;
                        highest_tick = highest_tick.max(command.tick);
                    }

                    for message in self.decoder.decode(&packet.data)? {
                        match message {
                            NetMessage::GameEvent { id, values } => {
                                let Some(event) = resolved.iter().find(|r| r.id == id) else {
                                    continue;
                                };
                                self.record_event(
                                    event.table_index,
                                    id,
                                    values,
                                    command.tick,
                                    previous_tick,
                                    &roster,
                                    pattern,
                                    stats.as_mut(),
                                    &mut ticks,
                                );
                            }
                            NetMessage::UpdateStringTable { table, entries } => {
                                if table.eq_ignore_ascii_case(USERINFO_TABLE) {
                                    for (key, value) in &entries {
                                        roster.update(key, value);
                                    }
                                }
                                tables.apply_update(
                                    &table,
                                    entries.iter().map(|(k, v)| (k.as_str(), v.as_slice())),
                                );
                            }
                            NetMessage::Other { .. } => {}
                        }
                    }

                    if command.kind == CommandKind::Packet {
                        previous_tick = command.tick;
                    }
                }
                CommandKind::StringTables => {
                    if let RecordPayload::StringTables(data) = reader.read_payload(command.kind)? {
                        tables = StringTableSet::decode(&data)?;
                        roster = Roster::from_table(tables.table(USERINFO_TABLE));
                    }
                }
                CommandKind::Stop => break,
                kind => reader.skip_payload(kind)?,
            }
        }

        let mut healed = false;
        if header.is_incomplete() {
            let totals = ContainerTotals {
                highest_tick,
                packets,
                ..Default::default()
            };
            if !self.strict && totals.can_heal() {
                header.set_totals(highest_tick, packets, self.tick_interval);
                healed = true;
                tracing::info!(
                    ticks = highest_tick,
                    frames = packets,
                    "Healed incomplete demo header from scan"
                );
            } else {
                tracing::warn!(strict = self.strict, "Demo header is incomplete");
            }
        }

        let index = ImportantTickIndex::new(ticks, self.events);
        tracing::info!(important_ticks = index.len(), packets, "Demo scan finished");

        Ok(ScanReport {
            incomplete: header.is_incomplete(),
            header,
            index,
            pattern: stats,
            packets,
            highest_tick,
            healed,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn record_event(
        &self,
        table_index: usize,
        id: i32,
        values: Vec<EventValue>,
        tick: i32,
        previous_tick: i32,
        roster: &Roster,
        pattern: Option<&str>,
        stats: Option<&mut PatternStats>,
        ticks: &mut Vec<ImportantTick>,
    ) {
        let Some(event) = self.events.get(table_index) else {
            return;
        };
        let Some(descriptor) = self.source.descriptor(id) else {
            return;
        };

        let mut keys: EventKeys = descriptor
            .keys
            .iter()
            .map(|k| k.name.clone())
            .zip(values)
            .collect();
        roster.annotate(&mut keys, &event.user_keys);

        if let Some(stats) = stats
            && pattern.is_some_and(|p| p.eq_ignore_ascii_case(&event.name))
        {
            stats.fold(tick, &keys);
        }

        if !event.scan_only {
            ticks.push(ImportantTick {
                tick,
                previous_tick,
                event_index: table_index,
                keys,
            });
        }
    }
}
