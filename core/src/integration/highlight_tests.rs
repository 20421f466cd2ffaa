//! Scanning recorded matches and playing their highlight reels

use std::path::{Path, PathBuf};

use crate::config::{DemoConfig, RecordingConfig};
use crate::host::OsFileStore;
use crate::replay::runtime::{HighlightRequest, PlaybackOptions};
use crate::replay::scan::{BasicNetCodec, EventValue, ImportanceScanner, PlayerInfo};
use crate::replay::tables::USERINFO_TABLE;
use crate::test_utils::{HostEvent, SUBJECT_XUID, kill_codec, kill_events};
use crate::transport::{compose_highlights, scan_demo};

use super::test_utils::*;

const KILL_TICKS: [i32; 3] = [100, 140, 300];

/// 400 recorded frames in which the subject kills user 9 at each kill tick
fn record_match(dir: &Path) -> PathBuf {
    let codec = kill_codec();
    let mut recorder = new_recorder(dir, RecordingConfig::default());
    let subject = PlayerInfo {
        xuid: SUBJECT_XUID,
        user_id: 3,
        name: "alice".into(),
    };
    recorder
        .host_mut()
        .tables
        .table_mut(USERINFO_TABLE)
        .set("0", subject.encode());

    connect(&mut recorder, "match");
    record_frames(&mut recorder, 400, |_, n| {
        if KILL_TICKS.contains(&n) {
            let kill = codec
                .game_event(
                    "player_death",
                    &[("userid", EventValue::Int(9)), ("attacker", EventValue::Int(3))],
                )
                .unwrap();
            BasicNetCodec::encode(&[kill])
        } else {
            filler_message(b"frame")
        }
    });
    recorder.stop_recording().unwrap().path
}

fn reel_config() -> DemoConfig {
    let mut config = DemoConfig::default();
    config.highlights.time_before = 50.0 * FRAME_TIME;
    config.highlights.time_after = 10.0 * FRAME_TIME;
    config
}

#[test]
fn test_recorded_match_composes_two_segments() {
    let dir = tempfile::tempdir().unwrap();
    let path = record_match(dir.path());

    let report = compose_highlights(
        &OsFileStore::new(dir.path()),
        &path,
        &kill_events(),
        &kill_codec(),
        SUBJECT_XUID,
        false,
        &reel_config(),
    )
    .unwrap();

    assert_eq!(report.important_ticks, 3);
    assert_eq!(report.segments.len(), 2);

    let first = report.segments[0];
    assert_eq!(first.first_event_tick, 100);
    assert_eq!(first.last_event_tick, 140);
    assert_eq!(first.event_count, 2);
    assert_eq!(first.seek_to_tick, 49);
    assert_eq!(first.play_to_tick, 150);

    let second = report.segments[1];
    assert_eq!(second.first_event_tick, 300);
    assert_eq!(second.seek_to_tick, 249);
    assert_eq!(second.subject_id, SUBJECT_XUID);
}

#[test]
fn test_scan_annotates_roster_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = record_match(dir.path());
    let report = scan_demo(
        &OsFileStore::new(dir.path()),
        &path,
        None,
        &kill_events(),
        &kill_codec(),
        &DemoConfig::default(),
    )
    .unwrap();

    let ticks: Vec<i32> = report.index.iter().map(|t| t.tick).collect();
    assert_eq!(ticks, KILL_TICKS.to_vec());
    let first = report.index.get(0).unwrap();
    assert_eq!(first.previous_tick, 99);
    assert_eq!(first.keys.get_u64("attacker_xuid"), Some(SUBJECT_XUID));
    assert_eq!(
        first.keys.get("attacker_name").map(|v| v.to_string()),
        Some("alice".to_string())
    );
    // User 9 never appears in the roster
    assert_eq!(first.keys.get_u64("victim_xuid"), None);
}

#[test]
fn test_highlight_playback_skips_between_segments() {
    let dir = tempfile::tempdir().unwrap();
    let path = record_match(dir.path());
    let events = kill_events();
    let codec = kill_codec();
    let scanner = ImportanceScanner::new(&events, &codec, &codec);

    let mut player = new_player(dir.path(), reel_config());
    let options = PlaybackOptions {
        highlight: Some(HighlightRequest {
            subject: SUBJECT_XUID,
            lowlights: false,
        }),
        ..Default::default()
    };
    player.open(&path, options).unwrap();
    assert_eq!(player.scan_important_ticks(&scanner).unwrap(), 3);
    assert_eq!(player.highlights().len(), 2);
    assert_eq!(player.current_highlight(), Some(0));

    play_to_end(&mut player, 2000);
    assert!(!player.is_playing());
    assert!(player.last_error().is_none());

    let progress: Vec<(bool, i32, i32)> = player
        .host()
        .log
        .iter()
        .filter_map(|e| match e {
            HostEvent::Progress {
                skipping,
                tick,
                play_to,
            } => Some((*skipping, *tick, *play_to)),
            _ => None,
        })
        .collect();
    assert_eq!(progress.first().map(|p| (p.0, p.2)), Some((true, 150)));
    assert!(progress.iter().any(|&(skipping, _, play_to)| skipping && play_to == 310));
    assert!(progress.iter().any(|&(skipping, _, play_to)| !skipping && play_to == 150));

    // Skipped packets are still applied, in order
    let ticks = player.host().payload_ticks();
    assert!(ticks.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(ticks.last(), Some(&400));
}

#[test]
fn test_lowlights_without_victim_entry_play_linearly() {
    let dir = tempfile::tempdir().unwrap();
    let path = record_match(dir.path());
    let events = kill_events();
    let codec = kill_codec();
    let scanner = ImportanceScanner::new(&events, &codec, &codec);

    let mut player = new_player(dir.path(), reel_config());
    let options = PlaybackOptions {
        highlight: Some(HighlightRequest {
            subject: SUBJECT_XUID,
            lowlights: true,
        }),
        ..Default::default()
    };
    player.open(&path, options).unwrap();
    player.scan_important_ticks(&scanner).unwrap();
    assert!(player.highlights().is_empty());
    assert_eq!(player.current_highlight(), None);

    play_to_end(&mut player, 2000);
    assert!(
        !player
            .host()
            .log
            .iter()
            .any(|e| matches!(e, HostEvent::Progress { .. }))
    );
}

#[test]
fn test_skip_to_next_important_lands_before_event() {
    let dir = tempfile::tempdir().unwrap();
    let path = record_match(dir.path());
    let events = kill_events();
    let codec = kill_codec();
    let scanner = ImportanceScanner::new(&events, &codec, &codec);

    let mut player = new_player(dir.path(), DemoConfig::default());
    player.open(&path, PlaybackOptions::default()).unwrap();
    player.run_frame(0.0);
    player.scan_important_ticks(&scanner).unwrap();

    assert!(player.skip_to_next_important(Some("player_death")));
    player.run_frame(0.0);
    // Half a second of lead-in at 64 ticks per second
    assert_eq!(player.playback_tick(), 68);
    assert!(!player.skip_to_next_important(Some("round_end")));
}
