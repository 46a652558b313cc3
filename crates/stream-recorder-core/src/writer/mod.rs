pub(crate) mod avi;
mod ffmpeg;
mod segment;

pub use {
    avi::{AviOutput, AviWriter, AviWriterFactory},
    ffmpeg::{DEFAULT_FFMPEG_PROGRAM, FfmpegWriter, FfmpegWriterFactory},
    segment::{Segment, SegmentRecord},
};

use crate::{AudioFormat, Frame, WriterError};

use std::path::PathBuf;

use async_trait::async_trait;

/// Parameters a segment container is opened with.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSpec {
    /// Target file path. Must not exist yet.
    pub path: PathBuf,
    /// Nominal frames per second written into the container header.
    pub frame_rate: f64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Codec identifier (FourCC).
    pub codec: String,
    /// Layout of the audio stream, if the segment carries one.
    pub audio: Option<AudioFormat>,
}

/// An open container accepting frames.
///
/// Once [`close`](SegmentWriter::close) returns `Ok`, the file is a complete,
/// independently parseable container.
#[async_trait]
pub trait SegmentWriter: Send {
    /// Appends one frame.
    async fn write(&mut self, frame: &Frame) -> Result<(), WriterError>;

    /// Flushes and finalizes the container.
    async fn close(&mut self) -> Result<(), WriterError>;
}

/// Opens [`SegmentWriter`]s for a container format.
#[async_trait]
pub trait WriterFactory: Send + Sync {
    /// File extension used for segments, without the dot.
    fn extension(&self) -> &str;

    /// Creates the container file described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::OpenFailed`] on disk failures and
    /// [`WriterError::UnsupportedCodec`] if `spec.codec` is not supported.
    async fn open(&self, spec: &SegmentSpec) -> Result<Box<dyn SegmentWriter>, WriterError>;
}
