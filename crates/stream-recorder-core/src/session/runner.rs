//! The per-session event loop.
//!
//! A [`Session`] owns its source and its single open segment. Frames, stop
//! requests and rotations are handled one at a time on the session's own
//! task, so no two writes ever reach the same writer concurrently.

use crate::{
    BoundaryClock, BoundaryPolicy, CoreResult, Frame, FrameSource, LifecycleError,
    LifecycleEvent, Phase, Segment, SegmentRecord, SegmentSpec, SessionSettings, WriterFactory,
    session::outcome::SessionReport, session_tag,
};

use std::{panic::Location, sync::Arc};

use error_location::ErrorLocation;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

pub(crate) struct Session {
    id: Uuid,
    tag: String,
    policy: BoundaryPolicy,
    settings: Arc<SessionSettings>,
    writers: Arc<dyn WriterFactory>,
    source: Box<dyn FrameSource>,
    lifecycle: LifecycleEvent,
    phase: watch::Sender<Phase>,
    clock: BoundaryClock,
    segment: Option<Segment>,
    next_index: u64,
    finished: Vec<SegmentRecord>,
    frames_written: u64,
    error: Option<String>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: Uuid,
        epoch_ms: i64,
        policy: BoundaryPolicy,
        settings: Arc<SessionSettings>,
        writers: Arc<dyn WriterFactory>,
        source: Box<dyn FrameSource>,
        lifecycle: LifecycleEvent,
        phase: watch::Sender<Phase>,
    ) -> Self {
        Self {
            id,
            tag: session_tag(epoch_ms, id),
            clock: BoundaryClock::new(&policy),
            policy,
            settings,
            writers,
            source,
            lifecycle,
            phase,
            segment: None,
            next_index: 0,
            finished: Vec::new(),
            frames_written: 0,
            error: None,
        }
    }

    /// Drives the session until a stop is requested, the source ends, or a
    /// writer fails. Always finalizes and releases everything it owns.
    #[instrument(skip_all, fields(session_id = %self.id, source = self.source.identifier()))]
    pub(crate) async fn run(mut self, mut stop_rx: watch::Receiver<bool>) -> SessionReport {
        info!(policy = ?self.policy, "Session started");

        loop {
            let next = tokio::select! {
                biased;
                _ = stop_requested(&mut stop_rx) => {
                    debug!("Stop requested");
                    break;
                }
                next = self.source.next() => next,
            };

            match next {
                Ok(Some(frame)) => {
                    if let Err(e) = self.handle_frame(frame).await {
                        error!(error = ?e, "Session ended by error");
                        self.error = Some(e.to_string());
                        break;
                    }
                }
                Ok(None) => {
                    info!("Source reached end of stream");
                    break;
                }
                Err(e) => {
                    warn!(error = ?e, "Source read failed, treating as end of stream");
                    break;
                }
            }
        }

        self.finish().await
    }

    async fn handle_frame(&mut self, frame: Frame) -> CoreResult<()> {
        if self.segment.is_none() {
            self.open_segment(&frame).await?;
            self.transition(Phase::Recording)?;
        } else if self.clock.should_rotate(frame.captured_at) {
            self.rotate(&frame).await?;
        }

        if let Some(segment) = self.segment.as_mut() {
            segment.write(&frame).await?;
            self.frames_written += 1;

            if self.lifecycle.set() {
                info!(segment_index = segment.index(), "First frame written");
            }
        }

        Ok(())
    }

    async fn rotate(&mut self, frame: &Frame) -> CoreResult<()> {
        self.transition(Phase::Rotating)?;
        self.close_segment().await;
        self.open_segment(frame).await?;
        self.transition(Phase::Recording)?;
        Ok(())
    }

    async fn open_segment(&mut self, frame: &Frame) -> CoreResult<()> {
        let index = self.next_index;
        let path = self.policy.segment_path(
            &self.settings.output_dir,
            &self.tag,
            index,
            self.writers.extension(),
        );

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let spec = SegmentSpec {
            path,
            frame_rate: self.settings.frame_rate,
            width: frame.width,
            height: frame.height,
            codec: self.settings.codec.clone(),
            audio: frame.audio.as_ref().map(|audio| audio.format),
        };

        let segment = Segment::open(self.writers.as_ref(), index, spec, frame.captured_at).await?;

        self.clock.reset(frame.captured_at);
        self.next_index += 1;
        self.segment = Some(segment);

        Ok(())
    }

    /// Best-effort: close failures are logged, never propagated.
    async fn close_segment(&mut self) {
        let Some(mut segment) = self.segment.take() else {
            return;
        };

        if let Err(e) = segment.close().await {
            warn!(
                segment_index = segment.index(),
                path = ?segment.path(),
                error = ?e,
                "Segment close failed"
            );
        }

        self.finished.push(segment.record());
    }

    async fn finish(mut self) -> SessionReport {
        if let Err(e) = self.transition(Phase::Stopping) {
            warn!(error = ?e, "Unexpected phase while stopping");
        }

        self.close_segment().await;
        self.source.close().await;

        if let Err(e) = self.transition(Phase::Closed) {
            warn!(error = ?e, "Unexpected phase while closing");
        }

        info!(
            frames = self.frames_written,
            segments = self.finished.len(),
            "Session closed"
        );

        SessionReport {
            session_id: self.id,
            segments: self.finished,
            frames_written: self.frames_written,
            error: self.error,
        }
    }

    #[track_caller]
    fn transition(&self, to: Phase) -> Result<(), LifecycleError> {
        let from = *self.phase.borrow();

        if !from.can_transition_to(to) {
            return Err(LifecycleError::IllegalTransition {
                from,
                to,
                location: ErrorLocation::from(Location::caller()),
            });
        }

        self.phase.send_replace(to);
        debug!(?from, ?to, "Phase changed");

        Ok(())
    }
}

/// Resolves once a stop is requested or the controller side is gone.
async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stop| *stop).await;
}
