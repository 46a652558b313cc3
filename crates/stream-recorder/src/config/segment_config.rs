use crate::config::default_segment_duration_secs;

use serde::{Deserialize, Serialize};

/// Rotation settings for segmented recordings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Length of each rotating segment in seconds.
    #[serde(default = "default_segment_duration_secs")]
    pub segment_duration_secs: f64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            segment_duration_secs: default_segment_duration_secs(),
        }
    }
}
