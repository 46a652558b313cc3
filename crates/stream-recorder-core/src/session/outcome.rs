use crate::SegmentRecord;

use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

/// Everything a finished session produced.
#[derive(Debug, Clone)]
pub(crate) struct SessionReport {
    pub(crate) session_id: Uuid,
    pub(crate) segments: Vec<SegmentRecord>,
    pub(crate) frames_written: u64,
    pub(crate) error: Option<String>,
}

/// Result of stopping a session. Stop always yields one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopOutcome {
    /// Session this outcome belongs to, if any.
    pub session_id: Option<Uuid>,
    /// Whether at least one frame was written and the last file was
    /// finalized cleanly.
    pub finalized: bool,
    /// The single file, or the most recent segment of a rotating session.
    pub path: Option<PathBuf>,
    /// Every file the session wrote, in order.
    pub segments: Vec<PathBuf>,
    /// Frames written across all segments.
    pub frames_written: u64,
    /// Error that ended the session early, if any.
    pub error: Option<String>,
}

impl StopOutcome {
    /// Outcome for a stop that found nothing recorded.
    pub fn empty(session_id: Option<Uuid>) -> Self {
        Self {
            session_id,
            finalized: false,
            path: None,
            segments: Vec::new(),
            frames_written: 0,
            error: None,
        }
    }
}

impl From<SessionReport> for StopOutcome {
    fn from(report: SessionReport) -> Self {
        let written: Vec<&SegmentRecord> = report
            .segments
            .iter()
            .filter(|segment| segment.frames > 0)
            .collect();

        let finalized = report.frames_written > 0
            && written.last().is_some_and(|segment| segment.finalized);

        Self {
            session_id: Some(report.session_id),
            finalized,
            path: written.last().map(|segment| segment.path.clone()),
            segments: written.iter().map(|segment| segment.path.clone()).collect(),
            frames_written: report.frames_written,
            error: report.error,
        }
    }
}
