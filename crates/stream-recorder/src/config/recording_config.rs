use crate::config::{
    default_codec, default_ffmpeg_path, default_frame_rate, default_negotiation_timeout_secs,
    default_output_dir, default_start_confirmation_timeout_secs,
};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// File format segments are written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    /// MJPEG in RIFF AVI, written in-process. Carries PCM audio.
    #[default]
    Avi,
    /// H.264 in MP4 with faststart, encoded by an ffmpeg child process.
    Mp4,
}

/// Container and output settings shared by every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Nominal frame rate written into container headers.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,
    /// Codec FourCC.
    #[serde(default = "default_codec")]
    pub codec: String,
    /// Segment file format.
    #[serde(default)]
    pub container: Container,
    /// ffmpeg binary used for the `mp4` container.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    /// Directory recordings are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// How long a stop waits for the first frame, in seconds.
    #[serde(default = "default_start_confirmation_timeout_secs")]
    pub start_confirmation_timeout_secs: f64,
    /// How long an offer may take to negotiate, in seconds.
    #[serde(default = "default_negotiation_timeout_secs")]
    pub negotiation_timeout_secs: f64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            codec: default_codec(),
            container: Container::default(),
            ffmpeg_path: default_ffmpeg_path(),
            output_dir: default_output_dir(),
            start_confirmation_timeout_secs: default_start_confirmation_timeout_secs(),
            negotiation_timeout_secs: default_negotiation_timeout_secs(),
        }
    }
}
