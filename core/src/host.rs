//! Host capability traits
//!
//! The recorder, player and scanner never reach into engine globals. Each
//! capability they need is a narrow trait injected at construction, so tests
//! can drive them with fakes.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::replay::runtime::BenchmarkEnvironment;
use crate::replay::tables::StringTableSet;
use crate::replay::types::{DemoHeader, SequenceInfo, ViewPose};

/// Simulation timing of the host
pub trait FrameClock {
    /// Seconds per simulation tick
    fn tick_interval(&self) -> f32;
    /// The client's simulation tick counter
    fn client_tick(&self) -> i32;
    /// Server network time in seconds (multiplayer)
    fn net_time(&self) -> f64;
    /// Wall-clock seconds, used for auto-resume and benchmarking
    fn real_time(&self) -> f64;
    fn max_clients(&self) -> u32 {
        1
    }
}

/// Access to the network channel's sequence counters
pub trait NetworkChannelControl {
    fn sequence_info(&self) -> SequenceInfo;
    fn set_sequence_info(&mut self, info: SequenceInfo);
}

/// Playback side of the client.
///
/// Errors returned from the `apply_*` methods stop playback.
pub trait DemoClient {
    fn apply_network_schema(&mut self, data: &[u8]) -> Result<()>;
    fn apply_string_tables(&mut self, data: &[u8]) -> Result<()>;
    /// Deliver one signon or packet payload
    fn apply_network_payload(&mut self, tick: i32, data: &[u8]) -> Result<()>;
    fn execute_console_command(&mut self, command: &str);
    fn decode_user_command(&mut self, slot: u8, sequence: i32, data: &[u8]) -> Result<()>;
    /// Deliver a blob to the callback registered under `callback`
    fn apply_custom_data(&mut self, callback: &str, data: &[u8]);

    fn on_playback_start(&mut self, _header: &DemoHeader) {}
    fn on_playback_stop(&mut self) {}
    /// Called after a rewind to the last resync point
    fn on_playback_restart(&mut self) {}

    fn set_view(&mut self, slot: usize, pose: &ViewPose);
    fn disconnect(&mut self);

    /// Highlight reel progress, `skipping` while seeking or fast-forwarding
    fn on_highlight_progress(&mut self, _skipping: bool, _current_tick: i32, _play_to_tick: i32) {}
    /// Capture a benchmark frame once its tick is reached
    fn capture_benchframe(&mut self, _name: &str) {}
    fn benchmark_environment(&self) -> BenchmarkEnvironment {
        BenchmarkEnvironment::default()
    }
}

/// Descriptive fields written into a new container header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionInfo {
    pub network_protocol: i32,
    pub server_name: String,
    pub client_name: String,
    pub map_name: String,
    pub game_directory: String,
}

/// Recording side of the client
pub trait RecordingSource {
    fn session_info(&self) -> SessionInfo;
    fn view_pose(&self, slot: usize) -> ViewPose;
    fn active_slots(&self) -> usize {
        1
    }
    /// Encode user command `command_number` for `slot`, if it exists
    fn encode_user_command(&self, slot: usize, command_number: i32) -> Option<Vec<u8>>;
    fn string_table_snapshot(&self) -> StringTableSet;
    fn network_schema_snapshot(&self) -> Vec<u8>;
    /// Console variables replayed as commands at demo start
    fn demo_convars(&self) -> Vec<String> {
        Vec::new()
    }
    /// Names of registered custom-data callbacks, in index order
    fn custom_data_callbacks(&self) -> Vec<String> {
        Vec::new()
    }
    /// Ask the server to resend signon data so it can be buffered
    fn request_full_update(&mut self) {}
    fn on_recording_started(&mut self, _path: &Path) {}
    fn on_recording_stopped(&mut self, _path: &Path) {}
}

/// Everything the player needs from the host
pub trait PlaybackHost: FrameClock + NetworkChannelControl + DemoClient {}
impl<T: FrameClock + NetworkChannelControl + DemoClient> PlaybackHost for T {}

/// Everything the recorder needs from the host
pub trait RecordingHost: FrameClock + NetworkChannelControl + RecordingSource {}
impl<T: FrameClock + NetworkChannelControl + RecordingSource> RecordingHost for T {}

/// Readable, writable and seekable byte stream
pub trait DemoStream: Read + Write + Seek {}
impl<T: Read + Write + Seek> DemoStream for T {}

/// Storage for containers and the signon buffer
pub trait FileStore {
    /// Open an existing file for reading
    fn open(&self, path: &Path) -> io::Result<Box<dyn DemoStream>>;
    /// Create or truncate a file for reading and writing
    fn create(&self, path: &Path) -> io::Result<Box<dyn DemoStream>>;
    fn exists(&self, path: &Path) -> bool;
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// [`FileStore`] over the OS filesystem, relative paths resolved under `root`
#[derive(Debug, Clone)]
pub struct OsFileStore {
    root: PathBuf,
}

impl OsFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Buffered read side of an [`OsFileStore`] file. Writes are rejected.
pub struct FileReader(BufReader<File>);

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Seek for FileReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.seek(pos)
    }
}

impl Write for FileReader {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "file was opened for reading",
        ))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Buffered write side of an [`OsFileStore`] file.
///
/// Seeking flushes pending output, so header rewrites land in place. Reads
/// flush first and then go straight to the file.
pub struct FileWriter(BufWriter<File>);

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Seek for FileWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.seek(pos)
    }
}

impl Read for FileWriter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.flush()?;
        self.0.get_mut().read(buf)
    }
}

impl FileStore for OsFileStore {
    fn open(&self, path: &Path) -> io::Result<Box<dyn DemoStream>> {
        let file = OpenOptions::new().read(true).open(self.resolve(path))?;
        Ok(Box::new(FileReader(BufReader::new(file))))
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn DemoStream>> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(full)?;
        Ok(Box::new(FileWriter(BufWriter::new(file))))
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(self.resolve(path))
    }
}
