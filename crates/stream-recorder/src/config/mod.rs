#[allow(clippy::module_inception)]
mod config;
mod recording_config;
mod segment_config;
mod server_config;

pub(crate) use {
    config::Config,
    recording_config::{Container, RecordingConfig},
    segment_config::SegmentConfig,
    server_config::ServerConfig,
};

use stream_recorder_core::{
    DEFAULT_CODEC, DEFAULT_FFMPEG_PROGRAM, DEFAULT_FRAME_RATE, DEFAULT_NEGOTIATION_TIMEOUT,
    DEFAULT_SEGMENT_DURATION, DEFAULT_START_CONFIRMATION_TIMEOUT,
};

use std::path::PathBuf;

use directories::ProjectDirs;

pub(crate) const DEFAULT_PORT: u16 = 7878;

pub(crate) fn default_port() -> u16 {
    DEFAULT_PORT
}

pub(crate) fn default_frame_rate() -> f64 {
    DEFAULT_FRAME_RATE
}

pub(crate) fn default_codec() -> String {
    DEFAULT_CODEC.to_string()
}

pub(crate) fn default_start_confirmation_timeout_secs() -> f64 {
    DEFAULT_START_CONFIRMATION_TIMEOUT.as_secs_f64()
}

pub(crate) fn default_negotiation_timeout_secs() -> f64 {
    DEFAULT_NEGOTIATION_TIMEOUT.as_secs_f64()
}

pub(crate) fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from(DEFAULT_FFMPEG_PROGRAM)
}

pub(crate) fn default_segment_duration_secs() -> f64 {
    DEFAULT_SEGMENT_DURATION.as_secs_f64()
}

/// `recordings` under the platform data directory, or relative to the
/// working directory when no home directory can be resolved.
pub(crate) fn default_output_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("recordings"))
        .unwrap_or_else(|| PathBuf::from("recordings"))
}

pub(crate) fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "stream-recorder", "Stream-Recorder")
}
