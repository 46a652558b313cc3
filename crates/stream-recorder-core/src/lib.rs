//! Stream Recorder Core Library
//!
//! Persists a live video stream into container files that stay independently
//! playable while the stream is still being written. A [`SessionController`]
//! owns at most one recording session at a time, drives it from a
//! [`FrameSource`], and hands frames to a [`SegmentWriter`] that is opened,
//! rotated and finalized according to a [`BoundaryPolicy`].
//!
//! # Example
//!
//! ```no_run
//! use stream_recorder_core::{
//!     AviWriterFactory, BoundaryPolicy, CoreResult, MjpegSource, SessionController,
//!     SessionSettings,
//! };
//!
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn run(negotiator: Arc<dyn stream_recorder_core::Negotiator>) -> CoreResult<()> {
//! let controller = SessionController::new(
//!     SessionSettings::default(),
//!     Arc::new(AviWriterFactory),
//!     negotiator,
//! );
//!
//! let source = MjpegSource::open("http://localhost:8080/video_feed").await?;
//! let policy = BoundaryPolicy::rotating(Duration::from_secs(10));
//! let session_id = controller.start_source(Box::new(source), policy).await?;
//!
//! let outcome = controller.closed(session_id).await?;
//! println!("Recorded {} segments", outcome.segments.len());
//! # Ok(())
//! # }
//! ```

mod error;
mod session;
mod source;
mod writer;

pub use {
    error::{LifecycleError, RecorderError, Result as CoreResult, SourceError, WriterError},
    session::{
        BoundaryClock, BoundaryPolicy, DEFAULT_CODEC, DEFAULT_FRAME_RATE,
        DEFAULT_NEGOTIATION_TIMEOUT, DEFAULT_SEGMENT_DURATION, DEFAULT_START_CONFIRMATION_TIMEOUT,
        LifecycleEvent, Phase, SessionController, SessionSettings, SessionStatus, StartResponse,
        StopOutcome, session_tag,
    },
    source::{
        AudioFormat, AudioSamples, Frame, FrameSource, MjpegSource, Negotiated, Negotiator,
        SessionDescription, TrackEvent, TrackPublisher, TrackSource, subscribe_track,
    },
    writer::{
        AviOutput, AviWriter, AviWriterFactory, DEFAULT_FFMPEG_PROGRAM, FfmpegWriter,
        FfmpegWriterFactory, Segment, SegmentRecord, SegmentSpec, SegmentWriter, WriterFactory,
    },
};

#[cfg(test)]
mod tests;
