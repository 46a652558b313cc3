use crate::{
    Frame, WriterError,
    writer::{SegmentSpec, SegmentWriter, WriterFactory},
};

use std::{
    panic::Location,
    path::{Path, PathBuf},
};

use error_location::ErrorLocation;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, instrument};

/// One output file, open or finalized.
///
/// Owns its writer exclusively. A segment moves from open to closed exactly
/// once: writes after that are rejected and further closes are no-ops.
pub struct Segment {
    index: u64,
    spec: SegmentSpec,
    writer: Box<dyn SegmentWriter>,
    frames: u64,
    started_at: Instant,
    closed: bool,
    finalized: bool,
}

/// Summary of a segment after it was closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentRecord {
    /// Position of the segment within its session, starting at 0.
    pub index: u64,
    /// Where the file was written.
    pub path: PathBuf,
    /// Frames accepted by the writer.
    pub frames: u64,
    /// Whether the writer finalized the container without error.
    pub finalized: bool,
}

impl Segment {
    /// Opens a new segment through `factory`.
    ///
    /// # Errors
    ///
    /// Propagates the factory's open error.
    #[instrument(skip(factory, spec), fields(path = ?spec.path))]
    pub async fn open(
        factory: &dyn WriterFactory,
        index: u64,
        spec: SegmentSpec,
        started_at: Instant,
    ) -> Result<Self, WriterError> {
        let writer = factory.open(&spec).await?;

        info!(segment_index = index, "Segment opened");

        Ok(Self {
            index,
            spec,
            writer,
            frames: 0,
            started_at,
            closed: false,
            finalized: false,
        })
    }

    /// Writes one frame.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::Closed`] if the segment was already closed, or
    /// the writer's own error.
    pub async fn write(&mut self, frame: &Frame) -> Result<(), WriterError> {
        if self.closed {
            return Err(WriterError::Closed {
                index: self.index,
                location: ErrorLocation::from(Location::caller()),
            });
        }

        self.writer.write(frame).await?;
        self.frames += 1;

        Ok(())
    }

    /// Finalizes the container. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the writer's close error on the first call only; the segment
    /// counts as closed either way.
    #[instrument(skip(self), fields(segment_index = self.index, frames = self.frames))]
    pub async fn close(&mut self) -> Result<(), WriterError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.writer.close().await?;
        self.finalized = true;

        info!(
            path = ?self.spec.path,
            duration_ms = self.started_at.elapsed().as_millis(),
            "Segment finalized"
        );

        Ok(())
    }

    /// Position within the session.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Output path.
    pub fn path(&self) -> &Path {
        &self.spec.path
    }

    /// Instant of the frame that opened the segment.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Whether the segment still accepts frames.
    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Snapshot for reporting.
    pub fn record(&self) -> SegmentRecord {
        SegmentRecord {
            index: self.index,
            path: self.spec.path.clone(),
            frames: self.frames,
            finalized: self.finalized,
        }
    }
}
