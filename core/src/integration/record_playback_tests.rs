//! Record → play round trips

use std::path::PathBuf;

use crate::config::{DemoConfig, RecordingConfig};
use crate::error::DemoError;
use crate::host::OsFileStore;
use crate::replay::runtime::{PlaybackOptions, SignonState};
use crate::replay::types::ViewTransition;
use crate::test_utils::HostEvent;
use crate::transport::list_demo;

use super::test_utils::*;

#[test]
fn test_recorded_session_plays_back_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = new_recorder(dir.path(), RecordingConfig::default());
    recorder.host_mut().convars = vec!["sv_cheats 0".into()];
    connect(&mut recorder, "session");
    record_frames(&mut recorder, 100, |_, _| filler_message(b"frame"));
    let summary = recorder.stop_recording().unwrap();

    assert_eq!(summary.path, PathBuf::from("session.dem"));
    assert_eq!(summary.ticks, 100);
    assert_eq!(summary.frames, 100);

    let mut player = new_player(dir.path(), DemoConfig::default());
    player
        .open(&summary.path, PlaybackOptions::default())
        .unwrap();
    assert_eq!(player.total_ticks(), 100);
    assert!(!player.healed());

    play_to_end(&mut player, 1000);
    assert!(!player.is_playing());
    assert!(player.last_error().is_none());

    let ticks = player.host().payload_ticks();
    // Two signon packets, then one packet per recorded frame
    assert_eq!(ticks.len(), 102);
    assert!(ticks.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(&ticks[2..], (1..=100).collect::<Vec<_>>().as_slice());

    let log = &player.host().log;
    assert!(log.contains(&HostEvent::Console("sv_cheats 0".into())));
    assert!(log.contains(&HostEvent::Disconnect));
    assert_eq!(log.last(), Some(&HostEvent::Stop));
}

#[test]
fn test_command_info_and_side_records_survive_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = new_recorder(dir.path(), RecordingConfig::default());
    recorder.host_mut().callbacks = vec!["ragdoll".into()];
    connect(&mut recorder, "sides");
    record_frames(&mut recorder, 80, |recorder, n| {
        recorder.record_user_input(n, 0);
        if n == 10 {
            recorder.record_custom_data(0, b"bone");
        }
        if n == 60 {
            recorder.reset_interpolation();
        }
        filler_message(b"frame")
    });
    let summary = recorder.stop_recording().unwrap();

    let mut player = new_player(dir.path(), DemoConfig::default());
    player
        .open(&summary.path, PlaybackOptions::default())
        .unwrap();
    player.run_frame(0.0);
    run_ticks(&mut player, 50);
    assert_eq!(player.playback_tick(), 50);
    let slot = player.last_command_info().slot(0);
    assert_eq!(slot.pose.origin.x, 50.0);
    assert_eq!(slot.transition, ViewTransition::Continuous);

    run_ticks(&mut player, 10);
    assert_eq!(
        player.last_command_info().slot(0).transition,
        ViewTransition::Discontinuous
    );

    play_to_end(&mut player, 1000);
    let log = &player.host().log;
    let user_commands: Vec<i32> = log
        .iter()
        .filter_map(|e| match e {
            HostEvent::UserCmd { slot: 0, sequence } => Some(*sequence),
            _ => None,
        })
        .collect();
    assert_eq!(user_commands, (1..=80).collect::<Vec<_>>());
    assert!(log.contains(&HostEvent::CustomData {
        callback: "ragdoll".into(),
        data: b"bone".to_vec(),
    }));
}

#[test]
fn test_crashed_recording_heals_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = new_recorder(dir.path(), RecordingConfig::default());
    connect(&mut recorder, "crash");
    record_frames(&mut recorder, 500, |_, _| filler_message(b"frame"));
    // Skip the clean close: no stop record and no trailer
    std::mem::forget(recorder);

    let header = list_demo(&OsFileStore::new(dir.path()), &PathBuf::from("crash.dem")).unwrap();
    assert!(header.is_incomplete());

    let mut player = new_player(dir.path(), DemoConfig::default());
    player
        .open(&PathBuf::from("crash.dem"), PlaybackOptions::default())
        .unwrap();
    assert!(player.healed());
    assert_eq!(player.total_ticks(), 500);
    assert_eq!(player.header().unwrap().playback_frames, 500);

    play_to_end(&mut player, 2000);
    assert!(!player.is_playing());
    assert!(matches!(player.last_error(), Some(DemoError::Framing { .. })));
    assert_eq!(player.host().payload_ticks().last(), Some(&500));
}

#[test]
fn test_intermediate_flush_keeps_trailer_current() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecordingConfig {
        flush_interval_frames: 100,
        ..Default::default()
    };
    let mut recorder = new_recorder(dir.path(), config);
    connect(&mut recorder, "flushed");
    record_frames(&mut recorder, 450, |_, _| filler_message(b"frame"));
    std::mem::forget(recorder);

    let header =
        list_demo(&OsFileStore::new(dir.path()), &PathBuf::from("flushed.dem")).unwrap();
    assert_eq!(header.playback_ticks, 400);
    assert_eq!(header.playback_frames, 400);

    let mut player = new_player(dir.path(), DemoConfig::default());
    player
        .open(&PathBuf::from("flushed.dem"), PlaybackOptions::default())
        .unwrap();
    assert!(!player.healed());
    assert_eq!(player.total_ticks(), 400);
}

#[test]
fn test_skip_back_replays_from_resync_point() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = new_recorder(dir.path(), RecordingConfig::default());
    connect(&mut recorder, "rewind");
    record_frames(&mut recorder, 200, |_, _| filler_message(b"frame"));
    let summary = recorder.stop_recording().unwrap();

    let mut player = new_player(dir.path(), DemoConfig::default());
    player
        .open(&summary.path, PlaybackOptions::default())
        .unwrap();
    player.run_frame(0.0);
    run_ticks(&mut player, 150);
    assert_eq!(player.playback_tick(), 150);

    player.skip_to_tick(50, false, false);
    assert!(player.host().log.contains(&HostEvent::Restart));
    player.run_frame(0.0);
    assert_eq!(player.playback_tick(), 50);

    let ticks = player.host().payload_ticks();
    let restart = ticks.iter().rposition(|&t| t == 1).unwrap();
    assert_eq!(&ticks[restart..], (1..=50).collect::<Vec<_>>().as_slice());

    play_to_end(&mut player, 1000);
    assert!(player.last_error().is_none());
    assert_eq!(player.host().payload_ticks().last(), Some(&200));
}

#[test]
fn test_second_connection_starts_numbered_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = new_recorder(dir.path(), RecordingConfig::default());
    connect(&mut recorder, "series");
    record_frames(&mut recorder, 20, |_, _| filler_message(b"first"));

    // Reconnect: the first file is closed and the next one numbered
    recorder.set_signon_state(SignonState::New);
    recorder.record_messages(&filler_message(b"signon"));
    recorder.record_packet();
    recorder.set_signon_state(SignonState::Spawn);
    recorder.record_packet();
    recorder.set_signon_state(SignonState::Full);
    record_frames(&mut recorder, 30, |_, _| filler_message(b"second"));
    let summary = recorder.stop_recording().unwrap();
    assert_eq!(summary.path, PathBuf::from("series_2.dem"));
    assert_eq!(summary.frames, 30);

    let store = OsFileStore::new(dir.path());
    let first = list_demo(&store, &PathBuf::from("series.dem")).unwrap();
    assert_eq!(first.playback_frames, 20);
}
