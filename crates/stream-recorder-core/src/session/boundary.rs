//! When to rotate or finalize segments.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::time::Instant;
use uuid::Uuid;

/// Segment length used by the rotating policy unless configured otherwise.
pub const DEFAULT_SEGMENT_DURATION: Duration = Duration::from_secs(10);

/// How a session splits the stream into files. Fixed for the session's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryPolicy {
    /// A new segment every `segment_duration`, indefinitely.
    Rotating {
        /// Target length of each segment.
        segment_duration: Duration,
    },
    /// One segment, finalized on explicit stop or end of stream.
    Single,
}

impl BoundaryPolicy {
    /// Rotating policy with the given segment length.
    pub fn rotating(segment_duration: Duration) -> Self {
        Self::Rotating { segment_duration }
    }

    /// Output path for segment `index` of the session tagged `session_tag`
    /// (see [`session_tag`]).
    ///
    /// Rotating sessions write `session_<tag>/segment_<index>` so indices
    /// never collide across sessions; single sessions write `stream_<tag>`
    /// directly into `output_dir`.
    pub fn segment_path(
        &self,
        output_dir: &Path,
        session_tag: &str,
        index: u64,
        extension: &str,
    ) -> PathBuf {
        match self {
            Self::Rotating { .. } => output_dir
                .join(format!("session_{}", session_tag))
                .join(format!("segment_{}.{}", index, extension)),
            Self::Single => output_dir.join(format!("stream_{}.{}", session_tag, extension)),
        }
    }
}

/// Name stem shared by a session's outputs: its start time in epoch
/// milliseconds, then the low 32 bits of its id so sessions started within
/// the same millisecond never share a path.
pub fn session_tag(session_epoch_ms: i64, session_id: Uuid) -> String {
    format!("{}_{:08x}", session_epoch_ms, session_id.as_u128() as u32)
}

/// Tracks elapsed time of the current segment against the policy.
#[derive(Debug, Clone)]
pub struct BoundaryClock {
    segment_duration: Option<Duration>,
    segment_start: Option<Instant>,
}

impl BoundaryClock {
    /// Creates a clock with no segment started.
    pub fn new(policy: &BoundaryPolicy) -> Self {
        let segment_duration = match policy {
            BoundaryPolicy::Rotating { segment_duration } => Some(*segment_duration),
            BoundaryPolicy::Single => None,
        };

        Self {
            segment_duration,
            segment_start: None,
        }
    }

    /// Marks `now` as the start of the current segment.
    pub fn reset(&mut self, now: Instant) {
        self.segment_start = Some(now);
    }

    /// Time since the current segment started.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.segment_start
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default()
    }

    /// Whether a frame arriving at `now` belongs in a new segment.
    pub fn should_rotate(&self, now: Instant) -> bool {
        match (self.segment_duration, self.segment_start) {
            (Some(duration), Some(_)) => self.elapsed(now) >= duration,
            _ => false,
        }
    }
}
