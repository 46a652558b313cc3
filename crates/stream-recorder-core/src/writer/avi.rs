//! Motion JPEG (plus optional PCM audio) in a RIFF AVI container.
//!
//! The header is written with zeroed size and frame-count fields when the
//! segment opens. Each frame is appended as a `00dc` chunk inside the `movi`
//! list, followed by a `01wb` chunk when it carries audio. Closing cuts the
//! file back to the last complete chunk, appends the `idx1` index and patches
//! the zeroed fields, at which point the file is playable on its own.

use crate::{
    AudioFormat, AudioSamples, Frame, WriterError,
    writer::{SegmentSpec, SegmentWriter, WriterFactory},
};

use std::{io, io::SeekFrom, panic::Location, path::PathBuf};

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use error_location::ErrorLocation;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt, BufWriter},
};
use tracing::{debug, info, instrument, warn};

/// FourCC of the only video codec this container carries.
const MJPEG_FOURCC: [u8; 4] = *b"MJPG";

const VIDEO_CHUNK: [u8; 4] = *b"00dc";
const AUDIO_CHUNK: [u8; 4] = *b"01wb";

// Fixed layout of the header written by `header()`.
const RIFF_SIZE_OFFSET: u64 = 4;
const AVIH_TOTAL_FRAMES_OFFSET: u64 = 48;
const AVIH_SUGGESTED_BUFFER_OFFSET: u64 = 60;
const STRH_LENGTH_OFFSET: u64 = 140;
const STRH_SUGGESTED_BUFFER_OFFSET: u64 = 144;
const AUDIO_STRH_LENGTH_OFFSET: u64 = 264;
const AUDIO_STRH_SUGGESTED_BUFFER_OFFSET: u64 = 268;

/// Header length of a video-only file.
pub(crate) const HEADER_LEN: u64 = 224;
/// Header length of a file with an audio stream.
pub(crate) const HEADER_LEN_WITH_AUDIO: u64 = 326;

const HDRL_LIST_SIZE: u32 = 192;
const HDRL_LIST_SIZE_WITH_AUDIO: u32 = 294;
const STRL_LIST_SIZE: u32 = 116;
const AUDIO_STRL_LIST_SIZE: u32 = 94;
const AVIH_SIZE: u32 = 56;
const STRH_SIZE: u32 = 56;
const STRF_SIZE: u32 = 40;
const WAVEFORMATEX_SIZE: u32 = 18;

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;
const RATE_SCALE: u32 = 1000;
const WAVE_FORMAT_PCM: u16 = 1;
const PCM_BITS_PER_SAMPLE: u16 = 16;

/// Opens [`AviWriter`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct AviWriterFactory;

#[async_trait]
impl WriterFactory for AviWriterFactory {
    fn extension(&self) -> &str {
        "avi"
    }

    async fn open(&self, spec: &SegmentSpec) -> Result<Box<dyn SegmentWriter>, WriterError> {
        Ok(Box::new(AviWriter::create(spec).await?))
    }
}

/// Where an [`AviWriter`] puts its bytes.
///
/// Besides writing and seeking, the destination must support cutting its
/// length so a write that failed part-way can be dropped before the index
/// goes in.
#[async_trait]
pub trait AviOutput: AsyncWrite + AsyncSeek + Unpin + Send {
    /// Truncates the destination to `len` bytes.
    async fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Flushes everything to durable storage.
    async fn sync(&mut self) -> io::Result<()>;
}

#[async_trait]
impl AviOutput for File {
    async fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len).await
    }

    async fn sync(&mut self) -> io::Result<()> {
        self.sync_all().await
    }
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    fourcc: [u8; 4],
    offset: u32,
    len: u32,
}

/// Writer for a single AVI file.
pub struct AviWriter<O: AviOutput = File> {
    path: PathBuf,
    out: Option<BufWriter<O>>,
    audio: Option<AudioFormat>,
    index: Vec<IndexEntry>,
    /// Offset of the `movi` FourCC; chunk offsets in `idx1` are relative to it.
    movi_start: u64,
    /// Absolute file offset just past the last complete chunk.
    position: u64,
    frames: u32,
    audio_bytes: u64,
    max_video_chunk: u32,
    max_audio_chunk: u32,
    /// Set when a write failed after some of its bytes may have gone out.
    failed: bool,
}

impl AviWriter<File> {
    /// Creates the file and writes the provisional header.
    ///
    /// The file must not exist yet; segments are never reopened.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::UnsupportedCodec`] for anything but `MJPG`, or
    /// [`WriterError::OpenFailed`] if the file cannot be created.
    #[instrument(skip(spec), fields(path = ?spec.path))]
    pub async fn create(spec: &SegmentSpec) -> Result<Self, WriterError> {
        check_spec(spec)?;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&spec.path)
            .await
            .map_err(|e| open_failed(spec, e))?;

        Self::with_output(spec, file).await
    }
}

impl<O: AviOutput> AviWriter<O> {
    /// Writes the provisional header into `output`, which must be empty.
    ///
    /// # Errors
    ///
    /// Same as [`AviWriter::create`].
    pub async fn with_output(spec: &SegmentSpec, output: O) -> Result<Self, WriterError> {
        let fourcc = check_spec(spec)?;

        let head = header(spec, fourcc);
        let mut out = BufWriter::new(output);
        out.write_all(&head)
            .await
            .map_err(|e| open_failed(spec, e))?;

        info!(
            width = spec.width,
            height = spec.height,
            frame_rate = spec.frame_rate,
            audio = ?spec.audio,
            "AVI segment created"
        );

        let header_len = head.len() as u64;

        Ok(Self {
            path: spec.path.clone(),
            out: Some(out),
            audio: spec.audio,
            index: Vec::new(),
            movi_start: header_len - 4,
            position: header_len,
            frames: 0,
            audio_bytes: 0,
            max_video_chunk: 0,
            max_audio_chunk: 0,
            failed: false,
        })
    }

    /// Number of video frames appended so far.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// The frame's audio, if it fits this file's audio stream.
    fn accepted_audio<'a>(&self, frame: &'a Frame) -> Option<&'a AudioSamples> {
        let audio = frame.audio.as_ref()?;

        let fits = self.audio.is_some_and(|format| {
            format == audio.format
                && !audio.data.is_empty()
                && audio.data.len() % usize::from(format.block_align()) == 0
        });

        if !fits {
            warn!(
                path = ?self.path,
                format = ?audio.format,
                len = audio.data.len(),
                "Dropping audio that does not fit the segment's audio stream"
            );
            return None;
        }

        Some(audio)
    }

    async fn finalize(&mut self, mut out: BufWriter<O>) -> io::Result<()> {
        out.flush().await?;
        let mut file = out.into_inner();

        let movi_end = self.position;
        if self.failed {
            warn!(path = ?self.path, "Dropping bytes of a failed write");
        }
        file.truncate(movi_end).await?;
        file.seek(SeekFrom::Start(movi_end)).await?;

        let mut idx1 = BytesMut::with_capacity(8 + 16 * self.index.len());
        idx1.put_slice(b"idx1");
        idx1.put_u32_le(to_u32(16 * self.index.len() as u64)?);
        for entry in &self.index {
            idx1.put_slice(&entry.fourcc);
            idx1.put_u32_le(AVIIF_KEYFRAME);
            idx1.put_u32_le(entry.offset);
            idx1.put_u32_le(entry.len);
        }
        file.write_all(&idx1).await?;

        let file_len = movi_end + idx1.len() as u64;
        let video_buffer = self.max_video_chunk.saturating_add(8);
        let audio_buffer = self.max_audio_chunk.saturating_add(8);

        let mut patches = vec![
            (RIFF_SIZE_OFFSET, to_u32(file_len - 8)?),
            (AVIH_TOTAL_FRAMES_OFFSET, self.frames),
            (AVIH_SUGGESTED_BUFFER_OFFSET, video_buffer.max(audio_buffer)),
            (STRH_LENGTH_OFFSET, self.frames),
            (STRH_SUGGESTED_BUFFER_OFFSET, video_buffer),
            (self.movi_start - 4, to_u32(movi_end - self.movi_start)?),
        ];
        if let Some(format) = self.audio {
            let samples = self.audio_bytes / u64::from(format.block_align().max(1));
            patches.push((AUDIO_STRH_LENGTH_OFFSET, to_u32(samples)?));
            patches.push((AUDIO_STRH_SUGGESTED_BUFFER_OFFSET, audio_buffer));
        }

        for (offset, value) in patches {
            file.seek(SeekFrom::Start(offset)).await?;
            file.write_all(&value.to_le_bytes()).await?;
        }
        file.flush().await?;
        file.sync().await?;

        Ok(())
    }
}

#[async_trait]
impl<O: AviOutput> SegmentWriter for AviWriter<O> {
    async fn write(&mut self, frame: &Frame) -> Result<(), WriterError> {
        let write_failed = |reason: String| WriterError::WriteFailed {
            reason,
            location: ErrorLocation::from(Location::caller()),
        };

        if self.out.is_none() {
            return Err(write_failed("AVI file already finalized".to_string()));
        }
        if self.failed {
            return Err(write_failed(
                "An earlier write failed, only close is accepted".to_string(),
            ));
        }
        if frame.data.is_empty() {
            return Err(write_failed("Empty frame payload".to_string()));
        }

        let audio = self.accepted_audio(frame);

        // Stage every chunk of the frame so it goes out in one write
        let mut staged = BytesMut::new();
        let mut entries = Vec::with_capacity(2);
        let mut end = self.position;
        stage_chunk(
            &mut staged,
            &mut entries,
            &mut end,
            self.movi_start,
            VIDEO_CHUNK,
            &frame.data,
        )
        .map_err(|e| write_failed(e.to_string()))?;
        if let Some(audio) = audio {
            stage_chunk(
                &mut staged,
                &mut entries,
                &mut end,
                self.movi_start,
                AUDIO_CHUNK,
                &audio.data,
            )
            .map_err(|e| write_failed(e.to_string()))?;
        }

        let Some(out) = self.out.as_mut() else {
            return Err(write_failed("AVI file already finalized".to_string()));
        };
        if let Err(e) = out.write_all(&staged).await {
            self.failed = true;
            return Err(write_failed(e.to_string()));
        }

        self.position = end;
        self.frames += 1;
        for entry in &entries {
            if entry.fourcc == AUDIO_CHUNK {
                self.audio_bytes += u64::from(entry.len);
                self.max_audio_chunk = self.max_audio_chunk.max(entry.len);
            } else {
                self.max_video_chunk = self.max_video_chunk.max(entry.len);
            }
        }
        self.index.extend(entries);

        Ok(())
    }

    async fn close(&mut self) -> Result<(), WriterError> {
        let Some(out) = self.out.take() else {
            return Ok(());
        };

        self.finalize(out)
            .await
            .map_err(|source| WriterError::CloseFailed {
                source,
                location: ErrorLocation::from(Location::caller()),
            })?;

        debug!(
            path = ?self.path,
            frames = self.frames,
            audio_bytes = self.audio_bytes,
            "AVI segment finalized"
        );

        Ok(())
    }
}

/// Appends one chunk to `staged` and records where it will land.
fn stage_chunk(
    staged: &mut BytesMut,
    entries: &mut Vec<IndexEntry>,
    end: &mut u64,
    movi_start: u64,
    fourcc: [u8; 4],
    payload: &[u8],
) -> io::Result<()> {
    let len = to_u32(payload.len() as u64)?;
    let offset = to_u32(*end - movi_start)?;
    let pad = len % 2;

    staged.put_slice(&fourcc);
    staged.put_u32_le(len);
    staged.put_slice(payload);
    if pad == 1 {
        staged.put_u8(0);
    }

    *end += 8 + u64::from(len) + u64::from(pad);
    entries.push(IndexEntry {
        fourcc,
        offset,
        len,
    });

    Ok(())
}

/// Validates what the header will record and returns the video FourCC.
#[track_caller]
fn check_spec(spec: &SegmentSpec) -> Result<[u8; 4], WriterError> {
    if !spec.codec.eq_ignore_ascii_case("MJPG") {
        return Err(WriterError::UnsupportedCodec {
            codec: spec.codec.clone(),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    if !spec.frame_rate.is_finite() || spec.frame_rate <= 0.0 {
        return Err(open_failed(
            spec,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid frame rate: {}", spec.frame_rate),
            ),
        ));
    }

    if let Some(audio) = spec.audio.filter(|a| a.channels == 0 || a.sample_rate == 0) {
        return Err(open_failed(
            spec,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid audio format: {:?}", audio),
            ),
        ));
    }

    Ok(MJPEG_FOURCC)
}

#[track_caller]
fn open_failed(spec: &SegmentSpec, source: io::Error) -> WriterError {
    WriterError::OpenFailed {
        path: spec.path.clone(),
        source,
        location: ErrorLocation::from(Location::caller()),
    }
}

fn to_u32(value: u64) -> io::Result<u32> {
    u32::try_from(value).map_err(|_| io::Error::other("AVI field exceeds 32 bits"))
}

fn header(spec: &SegmentSpec, fourcc: [u8; 4]) -> BytesMut {
    let micros_per_frame = (1_000_000.0 / spec.frame_rate).round() as u32;
    let rate = (spec.frame_rate * f64::from(RATE_SCALE)).round() as u32;
    let width = i32::try_from(spec.width).unwrap_or(i32::MAX);
    let height = i32::try_from(spec.height).unwrap_or(i32::MAX);
    let frame_right = i16::try_from(spec.width).unwrap_or(i16::MAX);
    let frame_bottom = i16::try_from(spec.height).unwrap_or(i16::MAX);

    let (hdrl_size, streams, header_len) = match spec.audio {
        Some(_) => (HDRL_LIST_SIZE_WITH_AUDIO, 2, HEADER_LEN_WITH_AUDIO),
        None => (HDRL_LIST_SIZE, 1, HEADER_LEN),
    };

    let mut h = BytesMut::with_capacity(header_len as usize);

    h.put_slice(b"RIFF");
    h.put_u32_le(0);
    h.put_slice(b"AVI ");

    h.put_slice(b"LIST");
    h.put_u32_le(hdrl_size);
    h.put_slice(b"hdrl");

    // MainAVIHeader
    h.put_slice(b"avih");
    h.put_u32_le(AVIH_SIZE);
    h.put_u32_le(micros_per_frame);
    h.put_u32_le(0); // max bytes per second
    h.put_u32_le(0); // padding granularity
    h.put_u32_le(AVIF_HASINDEX);
    h.put_u32_le(0); // total frames
    h.put_u32_le(0); // initial frames
    h.put_u32_le(streams);
    h.put_u32_le(0); // suggested buffer size
    h.put_u32_le(spec.width);
    h.put_u32_le(spec.height);
    h.put_bytes(0, 16);

    h.put_slice(b"LIST");
    h.put_u32_le(STRL_LIST_SIZE);
    h.put_slice(b"strl");

    // AVIStreamHeader
    h.put_slice(b"strh");
    h.put_u32_le(STRH_SIZE);
    h.put_slice(b"vids");
    h.put_slice(&fourcc);
    h.put_u32_le(0); // flags
    h.put_u16_le(0); // priority
    h.put_u16_le(0); // language
    h.put_u32_le(0); // initial frames
    h.put_u32_le(RATE_SCALE);
    h.put_u32_le(rate);
    h.put_u32_le(0); // start
    h.put_u32_le(0); // length
    h.put_u32_le(0); // suggested buffer size
    h.put_u32_le(u32::MAX); // default quality
    h.put_u32_le(0); // sample size
    h.put_i16_le(0);
    h.put_i16_le(0);
    h.put_i16_le(frame_right);
    h.put_i16_le(frame_bottom);

    // BITMAPINFOHEADER
    h.put_slice(b"strf");
    h.put_u32_le(STRF_SIZE);
    h.put_u32_le(STRF_SIZE);
    h.put_i32_le(width);
    h.put_i32_le(height);
    h.put_u16_le(1); // planes
    h.put_u16_le(24); // bit count
    h.put_slice(&fourcc);
    h.put_u32_le(spec.width.saturating_mul(spec.height).saturating_mul(3));
    h.put_i32_le(0);
    h.put_i32_le(0);
    h.put_u32_le(0);
    h.put_u32_le(0);

    if let Some(audio) = spec.audio {
        let block_align = audio.block_align();

        h.put_slice(b"LIST");
        h.put_u32_le(AUDIO_STRL_LIST_SIZE);
        h.put_slice(b"strl");

        h.put_slice(b"strh");
        h.put_u32_le(STRH_SIZE);
        h.put_slice(b"auds");
        h.put_u32_le(0); // handler
        h.put_u32_le(0); // flags
        h.put_u16_le(0); // priority
        h.put_u16_le(0); // language
        h.put_u32_le(0); // initial frames
        h.put_u32_le(u32::from(block_align));
        h.put_u32_le(audio.bytes_per_second());
        h.put_u32_le(0); // start
        h.put_u32_le(0); // length in samples
        h.put_u32_le(0); // suggested buffer size
        h.put_u32_le(u32::MAX); // default quality
        h.put_u32_le(u32::from(block_align));
        h.put_bytes(0, 8);

        // WAVEFORMATEX
        h.put_slice(b"strf");
        h.put_u32_le(WAVEFORMATEX_SIZE);
        h.put_u16_le(WAVE_FORMAT_PCM);
        h.put_u16_le(audio.channels);
        h.put_u32_le(audio.sample_rate);
        h.put_u32_le(audio.bytes_per_second());
        h.put_u16_le(block_align);
        h.put_u16_le(PCM_BITS_PER_SAMPLE);
        h.put_u16_le(0); // extra bytes
    }

    h.put_slice(b"LIST");
    h.put_u32_le(0);
    h.put_slice(b"movi");

    h
}
