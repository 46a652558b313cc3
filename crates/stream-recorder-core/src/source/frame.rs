use bytes::Bytes;
use tokio::time::Instant;

/// Layout of PCM audio: signed 16-bit little-endian, interleaved channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Samples per second, per channel.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
}

impl AudioFormat {
    /// Bytes per sample across all channels.
    pub fn block_align(&self) -> u16 {
        self.channels.saturating_mul(2)
    }

    /// Bytes of PCM per second of audio.
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate.saturating_mul(u32::from(self.block_align()))
    }
}

/// PCM captured alongside a video frame.
#[derive(Debug, Clone)]
pub struct AudioSamples {
    /// Sample layout.
    pub format: AudioFormat,
    /// Whole interleaved samples.
    pub data: Bytes,
}

/// One JPEG-encoded video frame with its arrival instant, plus any audio
/// captured with it.
///
/// Frames are transient: a frame is handed to at most one open segment and
/// is dropped once that write returns.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Encoded image payload.
    pub data: Bytes,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// When the frame arrived at the recorder.
    pub captured_at: Instant,
    /// Audio that belongs to this frame's time slot.
    pub audio: Option<AudioSamples>,
}

impl Frame {
    /// Creates a frame whose dimensions are already known.
    pub fn new(data: Bytes, width: u32, height: u32, captured_at: Instant) -> Self {
        Self {
            data,
            width,
            height,
            captured_at,
            audio: None,
        }
    }

    /// Attaches audio to the frame.
    pub fn with_audio(mut self, audio: AudioSamples) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Creates a frame from a JPEG payload, reading its dimensions from the
    /// start-of-frame marker.
    ///
    /// Returns `None` when the payload is not a JPEG image or carries no
    /// start-of-frame segment before the scan data.
    pub fn from_jpeg(data: Bytes, captured_at: Instant) -> Option<Self> {
        let (width, height) = jpeg_dimensions(&data)?;
        Some(Self::new(data, width, height, captured_at))
    }
}

/// Reads `(width, height)` from the first SOFn segment of a JPEG image.
pub(crate) fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return None;
    }

    let mut pos = 2;
    loop {
        if *data.get(pos)? != 0xFF {
            return None;
        }
        let marker = *data.get(pos + 1)?;

        match marker {
            // Fill byte
            0xFF => pos += 1,
            // Standalone markers carry no length
            0x01 | 0xD0..=0xD7 => pos += 2,
            // Scan data or end of image before any SOF
            0xD9 | 0xDA => return None,
            _ => {
                let len =
                    usize::from(u16::from_be_bytes([*data.get(pos + 2)?, *data.get(pos + 3)?]));
                let is_sof =
                    matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
                if is_sof {
                    let height = u16::from_be_bytes([*data.get(pos + 5)?, *data.get(pos + 6)?]);
                    let width = u16::from_be_bytes([*data.get(pos + 7)?, *data.get(pos + 8)?]);
                    return Some((u32::from(width), u32::from(height)));
                }
                pos += 2 + len;
            }
        }
    }
}
