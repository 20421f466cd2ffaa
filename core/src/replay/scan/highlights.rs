//! Highlight reel composition
//!
//! Walks an [`ImportantTickIndex`] for one subject and produces ordered
//! playback ranges. Events whose lead-in starts before the current segment
//! ends are merged into it.

use serde::Serialize;

use super::scanner::{ImportantTick, ImportantTickIndex};
use crate::config::HighlightConfig;

/// One watchable range of a highlight reel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HighlightSegment {
    /// Skip (without rendering) until this tick
    pub seek_to_tick: i32,
    /// Fast-forward until this tick
    pub fast_forward_to_tick: i32,
    /// Segment ends here
    pub play_to_tick: i32,
    pub first_event_tick: i32,
    pub last_event_tick: i32,
    pub event_count: u32,
    /// Player whose point of view the segment should follow
    pub subject_id: u64,
}

/// Builds highlight reels from an important-tick index
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightComposer {
    pub ticks_before: i32,
    pub ticks_after: i32,
    /// Event marking the end of the match
    pub end_marker_event: Option<String>,
    /// Lead-in before the end marker, in ticks
    pub end_lead_ticks: i32,
}

impl HighlightComposer {
    pub fn from_config(config: &HighlightConfig, tick_interval: f32) -> Self {
        let to_ticks = |seconds: f32| {
            if tick_interval > 0.0 {
                (seconds / tick_interval) as i32
            } else {
                0
            }
        };
        Self {
            ticks_before: to_ticks(config.time_before),
            ticks_after: to_ticks(config.time_after),
            end_marker_event: config.end_marker_event.clone(),
            end_lead_ticks: to_ticks(config.end_marker_lead_seconds),
        }
    }

    fn subject_key(lowlights: bool) -> &'static str {
        if lowlights { "victim_xuid" } else { "attacker_xuid" }
    }

    fn involves(entry: &ImportantTick, subject: u64, lowlights: bool) -> bool {
        entry.keys.get_u64(Self::subject_key(lowlights)) == Some(subject)
            || entry.keys.get_u64("player_xuid") == Some(subject)
    }

    /// Compose the reel for `subject`.
    ///
    /// In lowlights mode the subject is matched as the victim and each
    /// segment follows the attacker. `total_ticks` bounds the search for the
    /// end marker; zero means the whole index. An empty result means normal
    /// playback.
    pub fn compose(
        &self,
        index: &ImportantTickIndex,
        subject: u64,
        lowlights: bool,
        total_ticks: i32,
    ) -> Vec<HighlightSegment> {
        let mut segments = Vec::new();
        if subject == 0 {
            return segments;
        }

        let mut cursor = index.find_next_by_subject(0, subject);
        while let Some(i) = cursor {
            let Some(entry) = index.get(i) else { break };
            let mut last_tick = entry.tick;

            if Self::involves(entry, subject, lowlights) {
                let start = (entry.previous_tick - self.ticks_before).max(0);
                let mut segment = HighlightSegment {
                    seek_to_tick: start,
                    fast_forward_to_tick: start,
                    play_to_tick: entry.tick + self.ticks_after,
                    first_event_tick: entry.tick,
                    last_event_tick: entry.tick,
                    event_count: 1,
                    subject_id: if lowlights {
                        entry.keys.get_u64("attacker_xuid").unwrap_or(0)
                    } else {
                        subject
                    },
                };

                let mut next = index.find_next_by_subject(entry.tick + 1, subject);
                while let Some(j) = next {
                    let Some(candidate) = index.get(j) else { break };
                    if Self::involves(candidate, subject, lowlights) {
                        if candidate.previous_tick - self.ticks_before > segment.play_to_tick {
                            break;
                        }
                        segment.play_to_tick = candidate.tick + self.ticks_after;
                        segment.last_event_tick = candidate.tick;
                        segment.event_count += 1;
                        last_tick = candidate.tick;
                    }
                    next = index.find_next_by_subject(candidate.tick + 1, subject);
                }

                segments.push(segment);
            }

            cursor = index.find_next_by_subject(last_tick + 1, subject);
        }

        if !segments.is_empty()
            && let Some(end) = self.end_segment(index, subject, total_ticks)
        {
            segments.push(end);
        }

        tracing::debug!(subject, lowlights, segments = segments.len(), "Composed highlight reel");
        segments
    }

    fn end_segment(
        &self,
        index: &ImportantTickIndex,
        subject: u64,
        total_ticks: i32,
    ) -> Option<HighlightSegment> {
        let marker = self.end_marker_event.as_deref()?;
        let limit = if total_ticks > 0 { total_ticks.saturating_add(1) } else { i32::MAX };
        let entry = index.get(index.find_previous(limit, Some(marker))?)?;
        let start = (entry.previous_tick - self.end_lead_ticks).max(0);
        Some(HighlightSegment {
            seek_to_tick: start,
            fast_forward_to_tick: start,
            play_to_tick: entry.tick,
            first_event_tick: entry.tick,
            last_event_tick: entry.tick,
            event_count: 0,
            subject_id: subject,
        })
    }
}

/// Human-readable reel listing, one line per segment
pub fn describe_segments(segments: &[HighlightSegment]) -> Vec<String> {
    segments
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "#{i:<3} seek {:>7} ff {:>7} play to {:>7} events {} ({}..{}) subject {}",
                s.seek_to_tick,
                s.fast_forward_to_tick,
                s.play_to_tick,
                s.event_count,
                s.first_event_tick,
                s.last_event_tick,
                s.subject_id
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::scan::events::{EventKeys, EventValue, ImportantEvent, ImportantEventTable};

    const SUBJECT: u64 = 76561198000000001;
    const RIVAL: u64 = 76561198000000002;

    fn table() -> ImportantEventTable {
        ImportantEventTable::new(vec![
            ImportantEvent::new("player_death"),
            ImportantEvent::new("announce_phase_end"),
        ])
    }

    fn kill(tick: i32, attacker: u64, victim: u64) -> ImportantTick {
        let keys: EventKeys = [
            ("attacker_xuid", EventValue::U64(attacker)),
            ("victim_xuid", EventValue::U64(victim)),
        ]
        .into_iter()
        .collect();
        ImportantTick {
            tick,
            previous_tick: tick - 1,
            event_index: 0,
            keys,
        }
    }

    fn marker(tick: i32) -> ImportantTick {
        ImportantTick {
            tick,
            previous_tick: tick - 1,
            event_index: 1,
            keys: EventKeys::new(),
        }
    }

    fn composer(before: i32, after: i32) -> HighlightComposer {
        HighlightComposer {
            ticks_before: before,
            ticks_after: after,
            end_marker_event: None,
            end_lead_ticks: 0,
        }
    }

    #[test]
    fn test_merges_adjacent_events() {
        let index = ImportantTickIndex::new(
            vec![
                kill(100, SUBJECT, RIVAL),
                kill(140, SUBJECT, RIVAL),
                kill(300, SUBJECT, RIVAL),
            ],
            &table(),
        );
        let reel = composer(50, 0).compose(&index, SUBJECT, false, 0);

        assert_eq!(reel.len(), 2);
        assert_eq!(reel[0].first_event_tick, 100);
        assert_eq!(reel[0].last_event_tick, 140);
        assert_eq!(reel[0].event_count, 2);
        assert_eq!(reel[0].seek_to_tick, 49);
        assert_eq!(reel[0].play_to_tick, 140);
        assert_eq!(reel[1].first_event_tick, 300);
        assert_eq!(reel[1].event_count, 1);
        assert_eq!(reel[1].seek_to_tick, 249);
    }

    #[test]
    fn test_seek_clamps_to_zero() {
        let index = ImportantTickIndex::new(vec![kill(10, SUBJECT, RIVAL)], &table());
        let reel = composer(64, 32).compose(&index, SUBJECT, false, 0);
        assert_eq!(reel[0].seek_to_tick, 0);
        assert_eq!(reel[0].fast_forward_to_tick, 0);
        assert_eq!(reel[0].play_to_tick, 42);
    }

    #[test]
    fn test_ignores_events_where_subject_is_victim() {
        let index = ImportantTickIndex::new(
            vec![kill(100, RIVAL, SUBJECT), kill(500, SUBJECT, RIVAL)],
            &table(),
        );
        let reel = composer(10, 10).compose(&index, SUBJECT, false, 0);
        assert_eq!(reel.len(), 1);
        assert_eq!(reel[0].first_event_tick, 500);
        assert_eq!(reel[0].subject_id, SUBJECT);
    }

    #[test]
    fn test_lowlights_follow_attacker() {
        let index = ImportantTickIndex::new(
            vec![kill(100, RIVAL, SUBJECT), kill(500, SUBJECT, RIVAL)],
            &table(),
        );
        let reel = composer(10, 10).compose(&index, SUBJECT, true, 0);
        assert_eq!(reel.len(), 1);
        assert_eq!(reel[0].first_event_tick, 100);
        assert_eq!(reel[0].subject_id, RIVAL);
    }

    #[test]
    fn test_end_marker_segment() {
        let index = ImportantTickIndex::new(
            vec![kill(100, SUBJECT, RIVAL), marker(900), marker(2000)],
            &table(),
        );
        let mut composer = composer(10, 10);
        composer.end_marker_event = Some("announce_phase_end".into());
        composer.end_lead_ticks = 64;

        let reel = composer.compose(&index, SUBJECT, false, 1000);
        assert_eq!(reel.len(), 2);
        let end = reel[1];
        assert_eq!(end.event_count, 0);
        assert_eq!(end.seek_to_tick, 899 - 64);
        assert_eq!(end.play_to_tick, 900);
    }

    #[test]
    fn test_empty_reel_has_no_end_segment() {
        let index = ImportantTickIndex::new(vec![kill(100, RIVAL, RIVAL), marker(900)], &table());
        let mut composer = composer(10, 10);
        composer.end_marker_event = Some("announce_phase_end".into());
        assert!(composer.compose(&index, SUBJECT, false, 0).is_empty());
        assert!(composer.compose(&index, 0, false, 0).is_empty());
    }

    #[test]
    fn test_from_config_converts_seconds() {
        let config = HighlightConfig::default();
        let composer = HighlightComposer::from_config(&config, 1.0 / 64.0);
        assert_eq!(composer.ticks_before, 384);
        assert_eq!(composer.ticks_after, 256);
        assert_eq!(composer.end_lead_ticks, 64);
    }

    #[test]
    fn test_describe_segments() {
        let index = ImportantTickIndex::new(vec![kill(100, SUBJECT, RIVAL)], &table());
        let lines = describe_segments(&composer(0, 0).compose(&index, SUBJECT, false, 0));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("play to     100"));
    }
}
