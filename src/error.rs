//! Error types for the recording pipeline.
//!
//! Benign state-machine guards (starting while already recording, stopping
//! while idle) are not errors: they degrade to warn-level no-ops in
//! [`crate::session::RecordingSession`]. Everything here is a genuine
//! codec/container/archive failure that propagates to the caller.

use thiserror::Error;

/// Errors that can occur while recording
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("No encodable codec: {0}")]
    CodecUnavailable(String),

    #[error("Container writer failed to start: {0}")]
    WriterStartFailed(String),

    #[error("Frame encode failed: {0}")]
    FrameEncodeFailed(String),

    #[error("Frame snapshot failed: {0}")]
    FrameSnapshotFailed(String),

    #[error("Finalize failed: {0}")]
    FinalizeFailed(String),

    #[error("Archive finalize failed: {0}")]
    ArchiveFinalizeFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for recording operations
pub type RecordingResult<T> = Result<T, RecordingError>;
