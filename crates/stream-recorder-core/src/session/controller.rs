//! Start/stop coordination for recording sessions.
//!
//! All session replacement goes through one mutex-guarded slot: a start
//! tears down the previous session completely before the next one is
//! created, and a stop can never interleave with a start. Everything that
//! happens inside a session runs sequentially on that session's own task.

use crate::{
    BoundaryPolicy, CoreResult, FrameSource, LifecycleError, LifecycleEvent, Negotiator, Phase,
    SessionDescription, SessionSettings, SourceError, StopOutcome, WriterFactory,
    session::Session,
};

use std::{panic::Location, sync::Arc, time::Duration};

use chrono::Utc;
use error_location::ErrorLocation;
use serde::Serialize;
use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Reply to a successful start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartResponse {
    /// Identifier of the new session.
    pub session_id: Uuid,
    /// Negotiation answer for the producer.
    pub answer: SessionDescription,
}

/// Snapshot of the controller for status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Current phase; `Idle` when no session is held.
    pub phase: Phase,
    /// Session being reported on, if any.
    pub session_id: Option<Uuid>,
}

/// Owns at most one live recording session and serializes its replacement.
pub struct SessionController {
    settings: Arc<SessionSettings>,
    writers: Arc<dyn WriterFactory>,
    negotiator: Arc<dyn Negotiator>,
    slot: Mutex<Slot>,
}

#[derive(Default)]
struct Slot {
    active: Option<ActiveSession>,
    last: Option<StopOutcome>,
}

struct ActiveSession {
    id: Uuid,
    lifecycle: LifecycleEvent,
    phase: watch::Receiver<Phase>,
    stop_tx: watch::Sender<bool>,
    done: watch::Receiver<Option<StopOutcome>>,
    task: JoinHandle<StopOutcome>,
}

impl SessionController {
    /// Creates a controller with no session.
    pub fn new(
        settings: SessionSettings,
        writers: Arc<dyn WriterFactory>,
        negotiator: Arc<dyn Negotiator>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            writers,
            negotiator,
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Negotiates with a producer and starts recording its stream.
    ///
    /// Any live session is fully torn down first (writer closed best-effort,
    /// source released) without waiting for its first frame. Negotiation is
    /// bounded by the configured negotiation timeout, so stops and status
    /// queries queued behind a start always get their turn.
    ///
    /// # Errors
    ///
    /// Returns the negotiator's error, [`SourceError::Unavailable`] if the
    /// negotiation timed out, or an IO error if the output directory cannot
    /// be created.
    #[instrument(skip(self, offer))]
    pub async fn start(
        &self,
        offer: SessionDescription,
        policy: BoundaryPolicy,
    ) -> CoreResult<StartResponse> {
        let mut slot = self.slot.lock().await;
        Self::replace_prior(&mut slot).await;

        let limit = self.settings.negotiation_timeout;
        let negotiated = tokio::time::timeout(limit, self.negotiator.negotiate(offer))
            .await
            .map_err(|_| {
                warn!(timeout_ms = limit.as_millis(), "Negotiation timed out");
                SourceError::Unavailable {
                    identifier: "offer".to_string(),
                    reason: format!("Negotiation did not finish within {:?}", limit),
                    location: ErrorLocation::from(Location::caller()),
                }
            })??;
        let session_id = self.launch(&mut slot, negotiated.source, policy).await?;

        Ok(StartResponse {
            session_id,
            answer: negotiated.answer,
        })
    }

    /// Starts recording from an already-open source.
    ///
    /// Replaces any live session exactly like [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns an IO error if the output directory cannot be created.
    #[instrument(skip(self, source), fields(source = source.identifier()))]
    pub async fn start_source(
        &self,
        source: Box<dyn FrameSource>,
        policy: BoundaryPolicy,
    ) -> CoreResult<Uuid> {
        let mut slot = self.slot.lock().await;
        Self::replace_prior(&mut slot).await;

        self.launch(&mut slot, source, policy).await
    }

    /// Stops a session and reports what it produced. Never fails.
    ///
    /// `None` targets the current session. If nothing has been written yet,
    /// waits up to the configured start-confirmation timeout for the first
    /// write before finalizing. Stopping a session that is already gone
    /// returns its last known outcome without further I/O.
    #[instrument(skip(self))]
    pub async fn stop(&self, session_id: Option<Uuid>) -> StopOutcome {
        let mut slot = self.slot.lock().await;

        let targets_active = match (&slot.active, session_id) {
            (Some(active), Some(id)) => active.id == id,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if !targets_active {
            return slot.previous_outcome(session_id);
        }
        let Some(active) = slot.active.take() else {
            return slot.previous_outcome(session_id);
        };

        let outcome = active
            .stop(self.settings.start_confirmation_timeout)
            .await;

        info!(
            session_id = ?outcome.session_id,
            finalized = outcome.finalized,
            path = ?outcome.path,
            "Session stopped"
        );

        slot.last = Some(outcome.clone());
        outcome
    }

    /// Waits for a session to end on its own (end of stream or error).
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::UnknownSession`] if `session_id` is neither
    /// the live session nor the most recently stopped one.
    pub async fn closed(&self, session_id: Uuid) -> CoreResult<StopOutcome> {
        let mut done = {
            let slot = self.slot.lock().await;

            match &slot.active {
                Some(active) if active.id == session_id => active.done.clone(),
                _ => {
                    return match &slot.last {
                        Some(last) if last.session_id == Some(session_id) => Ok(last.clone()),
                        _ => Err(unknown_session(session_id).into()),
                    };
                }
            }
        };

        let outcome = done
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|outcome| outcome.clone());

        Ok(outcome.unwrap_or_else(|| StopOutcome::empty(Some(session_id))))
    }

    /// Current phase and session.
    pub async fn status(&self) -> SessionStatus {
        let slot = self.slot.lock().await;

        match &slot.active {
            Some(active) => SessionStatus {
                phase: *active.phase.borrow(),
                session_id: Some(active.id),
            },
            None => SessionStatus {
                phase: Phase::Idle,
                session_id: None,
            },
        }
    }

    async fn replace_prior(slot: &mut Slot) {
        if let Some(prior) = slot.active.take() {
            info!(session_id = %prior.id, "Replacing live session");
            let outcome = prior.shutdown().await;
            slot.last = Some(outcome);
        }
    }

    async fn launch(
        &self,
        slot: &mut Slot,
        source: Box<dyn FrameSource>,
        policy: BoundaryPolicy,
    ) -> CoreResult<Uuid> {
        tokio::fs::create_dir_all(&self.settings.output_dir).await?;

        let id = Uuid::now_v7();
        let epoch_ms = Utc::now().timestamp_millis();
        let lifecycle = LifecycleEvent::new();
        let (phase_tx, phase_rx) = watch::channel(Phase::Starting);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(None);

        let session = Session::new(
            id,
            epoch_ms,
            policy,
            Arc::clone(&self.settings),
            Arc::clone(&self.writers),
            source,
            lifecycle.clone(),
            phase_tx,
        );

        let task = tokio::spawn(async move {
            let outcome = StopOutcome::from(session.run(stop_rx).await);
            done_tx.send_replace(Some(outcome.clone()));
            outcome
        });

        slot.active = Some(ActiveSession {
            id,
            lifecycle,
            phase: phase_rx,
            stop_tx,
            done: done_rx,
            task,
        });

        info!(session_id = %id, ?policy, "Session launched");

        Ok(id)
    }
}

impl Slot {
    fn previous_outcome(&self, session_id: Option<Uuid>) -> StopOutcome {
        match (session_id, &self.last) {
            (None, Some(last)) => last.clone(),
            (Some(id), Some(last)) if last.session_id == Some(id) => last.clone(),
            (None, None) => StopOutcome::empty(None),
            (Some(id), _) => {
                warn!(error = %unknown_session(id), "Stop requested for unknown session");
                StopOutcome::empty(Some(id))
            }
        }
    }
}

impl ActiveSession {
    /// Stop with the start-confirmation barrier.
    async fn stop(mut self, barrier: Duration) -> StopOutcome {
        if !self.lifecycle.is_set() && self.done.borrow().is_none() {
            let started = tokio::select! {
                started = self.lifecycle.wait(barrier) => started,
                _ = session_ended(&mut self.done) => false,
            };

            if !started {
                warn!(
                    session_id = %self.id,
                    timeout_ms = barrier.as_millis(),
                    "No frame written before stop"
                );
            }
        }

        self.shutdown().await
    }

    /// Stop without waiting for the first write.
    async fn shutdown(self) -> StopOutcome {
        // The task may already have ended on its own
        let _ = self.stop_tx.send(true);

        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(session_id = %self.id, error = ?e, "Session task panicked");
                StopOutcome::empty(Some(self.id))
            }
        }
    }
}

async fn session_ended(done: &mut watch::Receiver<Option<StopOutcome>>) {
    let _ = done.wait_for(Option::is_some).await;
}

#[track_caller]
fn unknown_session(session_id: Uuid) -> LifecycleError {
    LifecycleError::UnknownSession {
        session_id,
        location: ErrorLocation::from(Location::caller()),
    }
}
