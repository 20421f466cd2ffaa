//! Error types for demo recording, playback and scanning

use thiserror::Error;

/// Errors produced by the demo container, recorder, player and scanner.
///
/// Recorder and player recover from these at their frame boundary; they are
/// only surfaced directly by the transport functions and the scanner.
#[derive(Debug, Error)]
pub enum DemoError {
    /// The container could not be opened, created, read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record is inconsistent with the bytes remaining in the file
    #[error("framing error at byte {position}: {reason}")]
    Framing { position: u64, reason: String },

    /// Header stamp or protocol version is not supported
    #[error("unsupported demo protocol {found} (supported {oldest}..={current})")]
    ProtocolMismatch {
        found: i32,
        oldest: i32,
        current: i32,
    },

    /// Trailer totals were never finalized
    #[error("demo container is incomplete (trailer totals are zero)")]
    IncompleteContainer,

    /// The container has already been closed
    #[error("demo container is closed")]
    Closed,

    #[error("no demo is being played back")]
    NotPlaying,

    #[error("already recording to {0}")]
    AlreadyRecording(String),

    #[error("invalid demo name: {0}")]
    InvalidName(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// A payload could not be decoded by a collaborator codec
    #[error("decode error: {0}")]
    Decode(String),

    /// Playback ended early; carries the reason reported by the player
    #[error("playback aborted: {0}")]
    Playback(String),
}

impl DemoError {
    pub(crate) fn framing(position: u64, reason: impl Into<String>) -> Self {
        Self::Framing {
            position,
            reason: reason.into(),
        }
    }

    /// Whether this error means the container bytes themselves are bad.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Framing { .. } | Self::ProtocolMismatch { .. })
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, DemoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: DemoError = io.into();
        assert!(matches!(err, DemoError::Io(_)));
        assert!(!err.is_corruption());
    }

    #[test]
    fn test_framing_message() {
        let err = DemoError::framing(1080, "payload length 99 exceeds remaining 4");
        assert!(err.is_corruption());
        assert_eq!(
            err.to_string(),
            "framing error at byte 1080: payload length 99 exceeds remaining 4"
        );
    }
}
