//! Configuration management for stream-recorder.
//!
//! Handles loading and saving TOML configuration files with cross-platform
//! paths, validation, and atomic write operations.

use crate::{
    AppError, AppResult,
    config::{Container, RecordingConfig, SegmentConfig, ServerConfig, project_dirs},
};

use stream_recorder_core::{
    AviWriterFactory, BoundaryPolicy, FfmpegWriterFactory, SessionSettings, WriterFactory,
};

use std::{
    fs,
    io::Write,
    panic::Location,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use error_location::ErrorLocation;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Main configuration struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Container and output settings.
    #[serde(default)]
    pub recording: RecordingConfig,
    /// Rotation settings for the `record` command.
    #[serde(default)]
    pub segments: SegmentConfig,
    /// Embedded web server configuration.
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from `path`, or from the platform config
    /// directory when no path is given.
    #[track_caller]
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load_from(&Self::config_path()?),
        }
    }

    /// Load configuration from `path`, writing the defaults there if the
    /// file does not exist yet.
    #[track_caller]
    #[instrument]
    pub fn load_from(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            info!("No config found, creating default");
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to read config: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to parse config: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        info!(config_path = ?path, "Configuration loaded");

        Ok(config)
    }

    /// Reject values no session could run with.
    #[track_caller]
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |reason: String| AppError::ConfigError {
            reason,
            location: ErrorLocation::from(Location::caller()),
        };

        let frame_rate = self.recording.frame_rate;
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(invalid(format!(
                "frame_rate must be positive, got {}",
                frame_rate
            )));
        }

        let codec = self.recording.codec.trim();
        if codec.is_empty() {
            return Err(invalid("codec must not be empty".to_string()));
        }

        let supported = match self.recording.container {
            Container::Avi => codec.eq_ignore_ascii_case("MJPG"),
            Container::Mp4 => {
                codec.eq_ignore_ascii_case("H264") || codec.eq_ignore_ascii_case("avc1")
            }
        };
        if !supported {
            return Err(invalid(format!(
                "codec {} is not supported by the {:?} container",
                codec, self.recording.container
            )));
        }

        let segment = seconds(
            "segment_duration_secs",
            self.segments.segment_duration_secs,
        )?;
        if segment.is_zero() {
            return Err(invalid(format!(
                "segment_duration_secs must be positive, got {}",
                self.segments.segment_duration_secs
            )));
        }

        seconds(
            "start_confirmation_timeout_secs",
            self.recording.start_confirmation_timeout_secs,
        )?;

        let negotiation = seconds(
            "negotiation_timeout_secs",
            self.recording.negotiation_timeout_secs,
        )?;
        if negotiation.is_zero() {
            return Err(invalid(format!(
                "negotiation_timeout_secs must be positive, got {}",
                self.recording.negotiation_timeout_secs
            )));
        }

        Ok(())
    }

    /// Save configuration to `path` using atomic write pattern.
    ///
    /// Writes to a temporary file first, then renames to prevent corruption
    /// if the process crashes during the write.
    #[track_caller]
    #[instrument(skip(self))]
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        let missing_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty() && !dir.exists());
        if let Some(dir) = missing_dir {
            fs::create_dir_all(dir)?;
            debug!(config_dir = ?dir, "Created config directory");
        }

        let contents = toml::to_string_pretty(self).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        // Atomic write: write to temp file then rename
        let temp_path = path.with_extension("toml.tmp");

        let mut temp_file = fs::File::create(&temp_path).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to create temp config file: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        temp_file
            .write_all(contents.as_bytes())
            .map_err(|e| AppError::ConfigError {
                reason: format!("Failed to write temp config file: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        temp_file.sync_all().map_err(|e| AppError::ConfigError {
            reason: format!("Failed to sync temp config file: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        fs::rename(&temp_path, path).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to rename temp config to final: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        info!(config_path = ?path, "Configuration saved (atomic write)");

        Ok(())
    }

    /// Settings handed to the session controller.
    ///
    /// # Errors
    ///
    /// Returns a config error for a timeout no [`Duration`] can hold.
    #[track_caller]
    pub fn session_settings(&self) -> AppResult<SessionSettings> {
        Ok(SessionSettings {
            output_dir: self.recording.output_dir.clone(),
            frame_rate: self.recording.frame_rate,
            codec: self.recording.codec.trim().to_string(),
            start_confirmation_timeout: seconds(
                "start_confirmation_timeout_secs",
                self.recording.start_confirmation_timeout_secs,
            )?,
            negotiation_timeout: seconds(
                "negotiation_timeout_secs",
                self.recording.negotiation_timeout_secs,
            )?,
        })
    }

    /// Rotating policy for the `record` command.
    #[track_caller]
    pub fn rotating_policy(&self) -> AppResult<BoundaryPolicy> {
        let duration = seconds(
            "segment_duration_secs",
            self.segments.segment_duration_secs,
        )?;
        Ok(BoundaryPolicy::rotating(duration))
    }

    /// Writer factory for the configured container.
    pub fn writer_factory(&self) -> Arc<dyn WriterFactory> {
        match self.recording.container {
            Container::Avi => Arc::new(AviWriterFactory),
            Container::Mp4 => Arc::new(FfmpegWriterFactory::new(&self.recording.ffmpeg_path)),
        }
    }

    #[track_caller]
    fn config_path() -> AppResult<PathBuf> {
        let proj_dirs = project_dirs().ok_or_else(|| AppError::ConfigError {
            reason: "Failed to get config directory".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}

/// `value` seconds as a [`Duration`], rejecting negative, non-finite and
/// overflowing values.
#[track_caller]
fn seconds(field: &str, value: f64) -> AppResult<Duration> {
    Duration::try_from_secs_f64(value).map_err(|e| AppError::ConfigError {
        reason: format!("{} must be a non-negative number of seconds, got {}: {}", field, value, e),
        location: ErrorLocation::from(Location::caller()),
    })
}
