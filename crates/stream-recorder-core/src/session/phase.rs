use serde::{Deserialize, Serialize};

/// Phase of a recording session.
///
/// `Idle` is reported by the controller when it holds no session; a session
/// itself begins in `Starting` and ends in `Closed`, which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No session exists.
    Idle,
    /// Session created, waiting for the first frame; no writer yet.
    Starting,
    /// A writer is open and accepting frames.
    Recording,
    /// Closing one segment and opening the next.
    Rotating,
    /// Finalizing the writer and releasing the source.
    Stopping,
    /// Terminal. The session performs no further I/O.
    Closed,
}

impl Phase {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;

        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Recording)
                | (Starting, Stopping)
                | (Recording, Rotating)
                | (Recording, Stopping)
                | (Rotating, Recording)
                | (Rotating, Stopping)
                | (Stopping, Closed)
        )
    }

    /// Whether the phase is terminal.
    pub fn is_terminal(self) -> bool {
        self == Phase::Closed
    }
}
