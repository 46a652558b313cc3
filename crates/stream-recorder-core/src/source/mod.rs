pub(crate) mod frame;
pub(crate) mod mjpeg;
mod track;

pub use {
    frame::{AudioFormat, AudioSamples, Frame},
    mjpeg::MjpegSource,
    track::{TrackEvent, TrackPublisher, TrackSource, subscribe_track},
};

use crate::SourceError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An ordered, non-repeating sequence of frames from a producer.
///
/// Implementations deliver frames in capture order and never deliver a
/// frame twice. Once [`close`](FrameSource::close) has been called,
/// [`next`](FrameSource::next) returns `Ok(None)`.
#[async_trait]
pub trait FrameSource: Send {
    /// Human-readable identifier used in logs.
    fn identifier(&self) -> &str;

    /// Waits for the next frame.
    ///
    /// Returns `Ok(None)` on graceful end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::ReadFailed`] when the underlying stream fails.
    async fn next(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Releases the underlying stream. Must not block.
    async fn close(&mut self);
}

/// Session description exchanged with a producer.
///
/// The controller never looks inside `sdp`; only the [`Negotiator`] does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Opaque negotiation body.
    pub sdp: String,
    /// `"offer"` or `"answer"`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl SessionDescription {
    /// Builds an answer description.
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: "answer".to_string(),
        }
    }
}

/// Result of a successful negotiation: the reply for the producer and the
/// connected source its frames will arrive on.
pub struct Negotiated {
    /// Description returned to the producer.
    pub answer: SessionDescription,
    /// Connected frame source.
    pub source: Box<dyn FrameSource>,
}

/// Turns a producer's offer into a connected [`FrameSource`].
#[async_trait]
pub trait Negotiator: Send + Sync {
    /// Negotiates with the producer.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Negotiation`] if the offer is rejected, or
    /// [`SourceError::Unavailable`] if the producer cannot be reached.
    async fn negotiate(&self, offer: SessionDescription) -> Result<Negotiated, SourceError>;
}
