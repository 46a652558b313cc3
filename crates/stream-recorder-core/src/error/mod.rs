use crate::session::Phase;

use std::{panic::Location, path::PathBuf};

use error_location::ErrorLocation;
use thiserror::Error;
use uuid::Uuid;

/// Frame source errors (transport or capture device).
#[derive(Error, Debug)]
pub enum SourceError {
    /// The device or stream could not be opened.
    #[error("Source unavailable: {identifier}: {reason} {location}")]
    Unavailable {
        /// Identifier the caller tried to open.
        identifier: String,
        /// Description of the failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Reading the next frame failed. Treated as end-of-stream by the controller.
    #[error("Source read failed: {reason} {location}")]
    ReadFailed {
        /// Description of the failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// The producer's negotiation payload was rejected.
    #[error("Negotiation failed: {reason} {location}")]
    Negotiation {
        /// Description of the failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },
}

/// Segment writer errors (encode or disk).
#[derive(Error, Debug)]
pub enum WriterError {
    /// The container file could not be created.
    #[error("Failed to open segment at {path:?}: {source} {location}")]
    OpenFailed {
        /// Target path of the segment.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// The requested codec is not supported by this writer.
    #[error("Unsupported codec: {codec} {location}")]
    UnsupportedCodec {
        /// Codec identifier that was requested.
        codec: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Writing a frame failed.
    #[error("Failed to write frame: {reason} {location}")]
    WriteFailed {
        /// Description of the failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Finalizing the container failed.
    #[error("Failed to finalize segment: {source} {location}")]
    CloseFailed {
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// A write was attempted on a segment that has already been closed.
    #[error("Segment {index} is closed {location}")]
    Closed {
        /// Index of the closed segment.
        index: u64,
        /// Source location where error occurred.
        location: ErrorLocation,
    },
}

/// Session lifecycle errors.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A phase change the state machine does not allow.
    #[error("Illegal transition {from:?} -> {to:?} {location}")]
    IllegalTransition {
        /// Phase the session was in.
        from: Phase,
        /// Phase that was requested.
        to: Phase,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// No session with this identifier is known to the controller.
    #[error("Unknown session {session_id} {location}")]
    UnknownSession {
        /// The identifier that was asked for.
        session_id: Uuid,
        /// Source location where error occurred.
        location: ErrorLocation,
    },
}

/// Top-level error for recorder operations.
#[derive(Error, Debug)]
pub enum RecorderError {
    /// Frame source failure.
    #[error("Source error: {source} {location}")]
    Source {
        /// The underlying source error.
        #[source]
        source: SourceError,
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// Segment writer failure.
    #[error("Writer error: {source} {location}")]
    Writer {
        /// The underlying writer error.
        #[source]
        source: WriterError,
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// Session lifecycle failure.
    #[error("Lifecycle error: {source} {location}")]
    Lifecycle {
        /// The underlying lifecycle error.
        #[source]
        source: LifecycleError,
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// IO error from output directory handling.
    #[error("IO error: {source} {location}")]
    Io {
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
        /// Location where this error was created.
        location: ErrorLocation,
    },
}

// Manual From impls with location tracking.
// Cannot use #[from] because it does not support extra fields.
impl From<SourceError> for RecorderError {
    #[track_caller]
    fn from(source: SourceError) -> Self {
        RecorderError::Source {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<WriterError> for RecorderError {
    #[track_caller]
    fn from(source: WriterError) -> Self {
        RecorderError::Writer {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<LifecycleError> for RecorderError {
    #[track_caller]
    fn from(source: LifecycleError) -> Self {
        RecorderError::Lifecycle {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<std::io::Error> for RecorderError {
    #[track_caller]
    fn from(source: std::io::Error) -> Self {
        RecorderError::Io {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

/// Result type alias using [`RecorderError`].
pub type Result<T> = std::result::Result<T, RecorderError>;
