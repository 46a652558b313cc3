//! Push-style frame delivery.
//!
//! A producer that pushes media (rather than being polled) publishes onto a
//! bounded channel; the session drains it through [`TrackSource`] like any
//! other [`FrameSource`].

use crate::{Frame, FrameSource, SourceError};

use std::panic::Location;

use async_trait::async_trait;
use error_location::ErrorLocation;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

/// Event published by a pushing producer.
#[derive(Debug, Clone)]
pub enum TrackEvent {
    /// A new frame is available.
    Frame(Frame),
    /// The producer finished the track.
    Ended,
}

/// Producer half of a track subscription.
#[derive(Debug, Clone)]
pub struct TrackPublisher {
    identifier: String,
    tx: mpsc::Sender<TrackEvent>,
}

/// Consumer half of a track subscription.
#[derive(Debug)]
pub struct TrackSource {
    identifier: String,
    rx: mpsc::Receiver<TrackEvent>,
    ended: bool,
}

/// Registers interest in a pushed track.
///
/// At most `capacity` events are buffered; a publisher that gets ahead of
/// the recorder waits for room.
pub fn subscribe_track(
    identifier: impl Into<String>,
    capacity: usize,
) -> (TrackPublisher, TrackSource) {
    let identifier = identifier.into();
    let (tx, rx) = mpsc::channel(capacity.max(1));

    (
        TrackPublisher {
            identifier: identifier.clone(),
            tx,
        },
        TrackSource {
            identifier,
            rx,
            ended: false,
        },
    )
}

impl TrackPublisher {
    /// Publishes a frame, waiting while the subscription buffer is full.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] once the subscriber has closed.
    #[instrument(skip(self, frame), fields(track = %self.identifier))]
    pub async fn publish(&self, frame: Frame) -> Result<(), SourceError> {
        self.tx
            .send(TrackEvent::Frame(frame))
            .await
            .map_err(|_| SourceError::Unavailable {
                identifier: self.identifier.clone(),
                reason: "subscriber closed".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    /// Signals end of track. Frames already published are still delivered.
    pub async fn end(self) {
        if self.tx.send(TrackEvent::Ended).await.is_err() {
            debug!(track = %self.identifier, "Track ended after subscriber closed");
        }
    }

    /// Whether the subscriber has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl FrameSource for TrackSource {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn next(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.ended {
            return Ok(None);
        }

        match self.rx.recv().await {
            Some(TrackEvent::Frame(frame)) => Ok(Some(frame)),
            // Dropping every publisher is a graceful end as well
            Some(TrackEvent::Ended) | None => {
                self.ended = true;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) {
        self.ended = true;
        self.rx.close();
        debug!(track = %self.identifier, "Track subscription closed");
    }
}
