//! MP4 segments encoded by an `ffmpeg` child process.
//!
//! JPEG frames are piped to ffmpeg's stdin as an `image2pipe` stream and
//! re-encoded to H.264. `+faststart` moves the `moov` atom to the front when
//! ffmpeg finishes, so a segment is playable once its process exits cleanly.

use crate::{
    Frame, WriterError,
    writer::{SegmentSpec, SegmentWriter, WriterFactory},
};

use std::{
    io,
    panic::Location,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use error_location::ErrorLocation;
use tokio::{
    io::AsyncWriteExt,
    process::{Child, ChildStdin, Command},
};
use tracing::{debug, info, instrument, warn};

/// Program used when no explicit ffmpeg path is configured.
pub const DEFAULT_FFMPEG_PROGRAM: &str = "ffmpeg";

/// How long ffmpeg may take to flush and rewrite the file after its input ends.
const FINISH_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens [`FfmpegWriter`]s using the given ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegWriterFactory {
    program: PathBuf,
}

impl FfmpegWriterFactory {
    /// Factory running `program` (a path or a name looked up on `PATH`).
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegWriterFactory {
    fn default() -> Self {
        Self::new(DEFAULT_FFMPEG_PROGRAM)
    }
}

#[async_trait]
impl WriterFactory for FfmpegWriterFactory {
    fn extension(&self) -> &str {
        "mp4"
    }

    async fn open(&self, spec: &SegmentSpec) -> Result<Box<dyn SegmentWriter>, WriterError> {
        Ok(Box::new(FfmpegWriter::spawn(&self.program, spec).await?))
    }
}

/// One MP4 file being encoded by a dedicated ffmpeg process.
pub struct FfmpegWriter {
    path: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    frames: u64,
}

impl FfmpegWriter {
    /// Starts ffmpeg writing to `spec.path`, which must not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::UnsupportedCodec`] for anything but H.264, or
    /// [`WriterError::OpenFailed`] if the file exists or ffmpeg cannot be
    /// started.
    #[instrument(skip(spec), fields(path = ?spec.path))]
    pub async fn spawn(program: &Path, spec: &SegmentSpec) -> Result<Self, WriterError> {
        let encoder = encoder_for(&spec.codec)?;

        let open_failed = |source: io::Error| WriterError::OpenFailed {
            path: spec.path.clone(),
            source,
            location: ErrorLocation::from(Location::caller()),
        };

        if !spec.frame_rate.is_finite() || spec.frame_rate <= 0.0 {
            return Err(open_failed(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid frame rate: {}", spec.frame_rate),
            )));
        }

        if tokio::fs::try_exists(&spec.path).await.map_err(open_failed)? {
            return Err(open_failed(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "Segment file already exists",
            )));
        }

        if spec.audio.is_some() {
            warn!("MP4 segments carry video only, audio is dropped");
        }

        let mut child = Command::new(program)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-n"])
            .args(["-f", "image2pipe", "-c:v", "mjpeg"])
            .arg("-framerate")
            .arg(spec.frame_rate.to_string())
            .args(["-i", "pipe:0", "-an"])
            .args(["-c:v", encoder, "-preset", "veryfast", "-pix_fmt", "yuv420p"])
            // yuv420p needs even dimensions
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .args(["-movflags", "+faststart"])
            .arg(&spec.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(open_failed)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| open_failed(io::Error::other("ffmpeg stdin was not captured")))?;

        info!(
            program = ?program,
            encoder,
            frame_rate = spec.frame_rate,
            "ffmpeg segment started"
        );

        Ok(Self {
            path: spec.path.clone(),
            child: Some(child),
            stdin: Some(stdin),
            frames: 0,
        })
    }

    /// Number of frames handed to ffmpeg so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    async fn finish(&mut self, child: Child) -> io::Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            // ffmpeg may already have exited; its status explains why
            if let Err(e) = stdin.shutdown().await {
                debug!(error = %e, "Closing ffmpeg stdin failed");
            }
        }

        let output = tokio::time::timeout(FINISH_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("ffmpeg did not finish within {:?}", FINISH_TIMEOUT),
                )
            })??;

        if !output.status.success() {
            return Err(io::Error::other(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl SegmentWriter for FfmpegWriter {
    async fn write(&mut self, frame: &Frame) -> Result<(), WriterError> {
        let write_failed = |reason: String| WriterError::WriteFailed {
            reason,
            location: ErrorLocation::from(Location::caller()),
        };

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(write_failed("ffmpeg input already closed".to_string()));
        };

        stdin
            .write_all(&frame.data)
            .await
            .map_err(|e| write_failed(format!("ffmpeg rejected frame: {}", e)))?;
        self.frames += 1;

        Ok(())
    }

    async fn close(&mut self) -> Result<(), WriterError> {
        let Some(child) = self.child.take() else {
            return Ok(());
        };

        self.finish(child)
            .await
            .map_err(|source| WriterError::CloseFailed {
                source,
                location: ErrorLocation::from(Location::caller()),
            })?;

        debug!(path = ?self.path, frames = self.frames, "MP4 segment finalized");

        Ok(())
    }
}

/// ffmpeg encoder for a codec name.
#[track_caller]
fn encoder_for(codec: &str) -> Result<&'static str, WriterError> {
    if codec.eq_ignore_ascii_case("H264") || codec.eq_ignore_ascii_case("avc1") {
        Ok("libx264")
    } else {
        Err(WriterError::UnsupportedCodec {
            codec: codec.to_string(),
            location: ErrorLocation::from(Location::caller()),
        })
    }
}
