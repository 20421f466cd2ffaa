//! Binary demo container (.dem)
//!
//! All integers and floats are little-endian.
//!
//! # File Structure
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │ Header (1072 bytes)                            │
//! │ ├─ stamp: [u8; 8] = "REELDEM\0"                │
//! │ ├─ demo_protocol: i32                          │
//! │ ├─ network_protocol: i32                       │
//! │ ├─ server/client/map/game names: [u8; 260] x4  │
//! │ ├─ playback_time: f32                          │
//! │ ├─ playback_ticks: i32                         │
//! │ ├─ playback_frames: i32                        │
//! │ └─ signon_length: i32                          │
//! ├────────────────────────────────────────────────┤
//! │ Signon prefix (signon_length bytes of records) │
//! ├────────────────────────────────────────────────┤
//! │ Records                                        │
//! │ ├─ kind: u8, tick: i32, slot: u8               │
//! │ └─ payload (self-describing length)            │
//! └────────────────────────────────────────────────┘
//! ```

mod reader;
mod writer;

pub use reader::DemoReader;
pub use writer::DemoWriter;
