//! Integration tests for the demo engine
//!
//! Sessions are recorded through the scripted host and the resulting files
//! are played back, scanned and turned into highlight reels.

#[cfg(test)]
mod highlight_tests;
#[cfg(test)]
mod record_playback_tests;

#[cfg(test)]
pub(crate) mod test_utils {
    use std::path::Path;

    use crate::config::{DemoConfig, RecordingConfig};
    use crate::host::OsFileStore;
    use crate::replay::runtime::{Player, Recorder, SignonState};
    use crate::replay::scan::{BasicNetCodec, NetMessage};
    use crate::test_utils::FakeHost;

    pub const FRAME_TIME: f32 = 1.0 / 64.0;

    /// Network payload the reference codec can decode but ignores
    pub fn filler_message(tag: &[u8]) -> Vec<u8> {
        BasicNetCodec::encode(&[NetMessage::Other {
            kind: 9,
            data: tag.to_vec(),
        }])
    }

    pub fn new_recorder(dir: &Path, config: RecordingConfig) -> Recorder<FakeHost> {
        Recorder::new(FakeHost::new(), Box::new(OsFileStore::new(dir)), config)
    }

    /// Request a recording and walk the host through a full connection
    pub fn connect(recorder: &mut Recorder<FakeHost>, name: &str) {
        recorder.start_recording(name, false).unwrap();
        recorder.set_signon_state(SignonState::New);
        recorder.record_messages(&filler_message(b"signon-a"));
        recorder.record_packet();
        recorder.set_signon_state(SignonState::Spawn);
        recorder.record_messages(&filler_message(b"signon-b"));
        recorder.record_packet();
        recorder.set_signon_state(SignonState::Full);
    }

    /// Advance the host one tick per frame. `frame` receives the frame
    /// number (from 1) and returns the network payload of that frame.
    pub fn record_frames(
        recorder: &mut Recorder<FakeHost>,
        frames: i32,
        mut frame: impl FnMut(&mut Recorder<FakeHost>, i32) -> Vec<u8>,
    ) {
        for n in 1..=frames {
            recorder.host_mut().client_tick += 1;
            recorder.host_mut().pose.origin.x += 1.0;
            let payload = frame(recorder, n);
            recorder.record_messages(&payload);
            recorder.record_packet();
        }
    }

    pub fn new_player(dir: &Path, config: DemoConfig) -> Player<FakeHost> {
        Player::new(FakeHost::new(), Box::new(OsFileStore::new(dir)), config)
    }

    pub fn run_ticks(player: &mut Player<FakeHost>, ticks: i32) {
        for _ in 0..ticks {
            player.run_frame(FRAME_TIME);
        }
    }

    pub fn play_to_end(player: &mut Player<FakeHost>, max_frames: usize) {
        for _ in 0..max_frames {
            if !player.is_playing() {
                break;
            }
            player.run_frame(FRAME_TIME);
        }
    }
}
