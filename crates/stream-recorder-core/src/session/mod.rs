mod boundary;
mod controller;
mod lifecycle;
mod outcome;
mod phase;
mod runner;
mod settings;

pub(crate) use runner::Session;

pub use {
    boundary::{BoundaryClock, BoundaryPolicy, DEFAULT_SEGMENT_DURATION, session_tag},
    controller::{SessionController, SessionStatus, StartResponse},
    lifecycle::LifecycleEvent,
    outcome::StopOutcome,
    phase::Phase,
    settings::{
        DEFAULT_CODEC, DEFAULT_FRAME_RATE, DEFAULT_NEGOTIATION_TIMEOUT,
        DEFAULT_START_CONFIRMATION_TIMEOUT, SessionSettings,
    },
};
