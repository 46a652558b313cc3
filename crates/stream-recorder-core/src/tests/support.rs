//! Fixtures shared by the core tests.

#![allow(clippy::unwrap_used)]

use crate::{
    AviOutput, AviWriterFactory, Frame, FrameSource, Negotiated, Negotiator, SegmentSpec,
    SegmentWriter, SessionDescription, SessionSettings, SourceError, TrackSource, WriterError,
    WriterFactory,
};

use std::{
    collections::VecDeque,
    io::{self, SeekFrom},
    panic::Location,
    path::Path,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use error_location::ErrorLocation;
use tokio::{
    fs::File,
    io::{AsyncSeek, AsyncWrite},
    time::Instant,
};

/// Minimal baseline JPEG: SOI, one SOF0 segment, `payload_len` filler bytes, EOI.
pub(crate) fn jpeg(width: u16, height: u16, payload_len: usize) -> Bytes {
    let mut data = BytesMut::new();
    data.put_slice(&[0xFF, 0xD8]);
    data.put_slice(&[0xFF, 0xC0]);
    data.put_u16(17);
    data.put_u8(8);
    data.put_u16(height);
    data.put_u16(width);
    data.put_u8(3);
    data.put_bytes(0x11, 9);
    data.put_bytes(0xAB, payload_len);
    data.put_slice(&[0xFF, 0xD9]);
    data.freeze()
}

/// A 64x48 frame captured `offset_ms` after `base`.
pub(crate) fn frame_at(base: Instant, offset_ms: u64) -> Frame {
    Frame::from_jpeg(jpeg(64, 48, 32), base + Duration::from_millis(offset_ms)).unwrap()
}

pub(crate) fn settings(output_dir: &Path, timeout: Duration) -> SessionSettings {
    SessionSettings {
        output_dir: output_dir.to_path_buf(),
        start_confirmation_timeout: timeout,
        ..SessionSettings::default()
    }
}

/// `multipart/x-mixed-replace` body with one part per frame.
pub(crate) fn multipart_body(boundary: &str, frames: &[Bytes], content_length: bool) -> Vec<u8> {
    let mut body = Vec::new();
    for frame in frames {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Type: image/jpeg\r\n");
        if content_length {
            body.extend_from_slice(format!("Content-Length: {}\r\n", frame.len()).as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(frame);
        body.extend_from_slice(b"\r\n");
    }
    body
}

/// Fields read back from a finished AVI file.
#[derive(Debug)]
pub(crate) struct AviSummary {
    pub(crate) header_frames: u32,
    pub(crate) stream_length: u32,
    pub(crate) streams: u32,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) handler: [u8; 4],
    pub(crate) chunks: Vec<Vec<u8>>,
    pub(crate) audio_chunks: Vec<Vec<u8>>,
    /// `(channels, sample_rate, block_align, length in samples)` of the audio stream.
    pub(crate) audio: Option<(u16, u32, u16, u32)>,
    pub(crate) index_entries: usize,
}

fn u16_at(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap())
}

fn u32_at(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

/// Parses a finalized AVI file, asserting every size field and index entry
/// is consistent with the bytes on disk.
pub(crate) fn read_avi(path: &Path) -> AviSummary {
    let data = std::fs::read(path).unwrap();

    assert_eq!(&data[0..4], b"RIFF");
    assert_eq!(u32_at(&data, 4) as usize, data.len() - 8);
    assert_eq!(&data[8..12], b"AVI ");
    assert_eq!(&data[12..16], b"LIST");
    assert_eq!(&data[20..24], b"hdrl");

    let movi_list = 20 + u32_at(&data, 16) as usize;
    assert_eq!(&data[movi_list..movi_list + 4], b"LIST");
    let movi_start = movi_list + 8;
    assert_eq!(&data[movi_start..movi_start + 4], b"movi");
    let movi_end = movi_start + u32_at(&data, movi_list + 4) as usize;

    let mut chunks = Vec::new();
    let mut audio_chunks = Vec::new();
    let mut layout = Vec::new();
    let mut pos = movi_start + 4;
    while pos < movi_end {
        let id: [u8; 4] = data[pos..pos + 4].try_into().unwrap();
        let len = u32_at(&data, pos + 4) as usize;
        let payload = data[pos + 8..pos + 8 + len].to_vec();
        assert!(&id == b"00dc" || &id == b"01wb", "unexpected chunk {:?}", id);
        if &id == b"00dc" {
            chunks.push(payload);
        } else {
            audio_chunks.push(payload);
        }
        layout.push((id, pos, len));
        pos += 8 + len + len % 2;
    }
    assert_eq!(pos, movi_end);

    assert_eq!(&data[movi_end..movi_end + 4], b"idx1");
    let index_len = u32_at(&data, movi_end + 4) as usize;
    assert_eq!(movi_end + 8 + index_len, data.len());

    let index_entries = index_len / 16;
    assert_eq!(index_entries, layout.len());
    for (i, (id, chunk_pos, len)) in layout.iter().enumerate() {
        let entry = movi_end + 8 + i * 16;
        assert_eq!(&data[entry..entry + 4], id);
        assert_eq!(movi_start + u32_at(&data, entry + 8) as usize, *chunk_pos);
        assert_eq!(u32_at(&data, entry + 12) as usize, *len);
    }

    let streams = u32_at(&data, 56);
    let audio = (streams == 2).then(|| {
        assert_eq!(&data[232..236], b"auds");
        (
            u16_at(&data, 298),
            u32_at(&data, 300),
            u16_at(&data, 308),
            u32_at(&data, 264),
        )
    });

    AviSummary {
        header_frames: u32_at(&data, 48),
        stream_length: u32_at(&data, 140),
        streams,
        width: u32_at(&data, 64),
        height: u32_at(&data, 68),
        handler: data[112..116].try_into().unwrap(),
        chunks,
        audio_chunks,
        audio,
        index_entries,
    }
}

/// Asserts the file is a complete container and returns its frame count.
pub(crate) fn assert_playable(path: &Path) -> usize {
    let avi = read_avi(path);
    assert_eq!(avi.header_frames as usize, avi.chunks.len());
    assert_eq!(avi.stream_length as usize, avi.chunks.len());
    assert_eq!(avi.index_entries, avi.chunks.len() + avi.audio_chunks.len());
    if let Some((_, _, block_align, samples)) = avi.audio {
        let audio_bytes: usize = avi.audio_chunks.iter().map(Vec::len).sum();
        assert_eq!(audio_bytes, samples as usize * usize::from(block_align));
    } else {
        assert!(avi.audio_chunks.is_empty());
    }
    avi.chunks.len()
}

/// Every regular file below `dir`, recursively.
pub(crate) fn files_under(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.extend(files_under(&path));
        } else {
            files.push(path);
        }
    }
    files.sort();
    files
}

/// Hands out pre-registered track subscriptions in order.
#[derive(Default)]
pub(crate) struct QueuedNegotiator {
    tracks: Mutex<VecDeque<TrackSource>>,
}

impl QueuedNegotiator {
    pub(crate) fn push(&self, track: TrackSource) {
        self.tracks.lock().unwrap().push_back(track);
    }
}

#[async_trait]
impl Negotiator for QueuedNegotiator {
    async fn negotiate(&self, offer: SessionDescription) -> Result<Negotiated, SourceError> {
        let track = self.tracks.lock().unwrap().pop_front();

        match track {
            Some(track) => Ok(Negotiated {
                answer: SessionDescription::answer(format!("accepted:{}", offer.sdp)),
                source: Box::new(track),
            }),
            None => Err(SourceError::Negotiation {
                reason: "no track offered".to_string(),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }
}

/// AVI factory that can be told to fail opens or closes.
#[derive(Default)]
pub(crate) struct FlakyWriterFactory {
    pub(crate) opens: AtomicUsize,
    pub(crate) fail_open_from: Option<usize>,
    pub(crate) fail_close: bool,
}

struct FlakyWriter {
    inner: Box<dyn SegmentWriter>,
    fail_close: bool,
}

#[async_trait]
impl WriterFactory for FlakyWriterFactory {
    fn extension(&self) -> &str {
        "avi"
    }

    async fn open(&self, spec: &SegmentSpec) -> Result<Box<dyn SegmentWriter>, WriterError> {
        let attempt = self.opens.fetch_add(1, Ordering::SeqCst);

        if self.fail_open_from.is_some_and(|from| attempt >= from) {
            return Err(WriterError::OpenFailed {
                path: spec.path.clone(),
                source: io::Error::other("disk full"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(Box::new(FlakyWriter {
            inner: AviWriterFactory.open(spec).await?,
            fail_close: self.fail_close,
        }))
    }
}

#[async_trait]
impl SegmentWriter for FlakyWriter {
    async fn write(&mut self, frame: &Frame) -> Result<(), WriterError> {
        self.inner.write(frame).await
    }

    async fn close(&mut self) -> Result<(), WriterError> {
        self.inner.close().await?;

        if self.fail_close {
            return Err(WriterError::CloseFailed {
                source: io::Error::other("flush rejected"),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        Ok(())
    }
}

/// Yields `frames` frames, then a read error.
pub(crate) struct BrokenSource {
    pub(crate) remaining: usize,
    pub(crate) base: Instant,
}

#[async_trait]
impl FrameSource for BrokenSource {
    fn identifier(&self) -> &str {
        "broken"
    }

    async fn next(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.remaining == 0 {
            return Err(SourceError::ReadFailed {
                reason: "connection reset".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        self.remaining -= 1;
        Ok(Some(frame_at(self.base, 0)))
    }

    async fn close(&mut self) {}
}

/// Never finishes negotiating.
pub(crate) struct HangingNegotiator;

#[async_trait]
impl Negotiator for HangingNegotiator {
    async fn negotiate(&self, _offer: SessionDescription) -> Result<Negotiated, SourceError> {
        std::future::pending().await
    }
}

/// File that accepts only as many bytes as its shared budget allows, then
/// fails every write until the budget is raised again.
pub(crate) struct BudgetedOutput {
    pub(crate) file: File,
    pub(crate) budget: Arc<AtomicU64>,
}

impl AsyncWrite for BudgetedOutput {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let budget = self.budget.load(Ordering::SeqCst);
        if budget == 0 {
            return Poll::Ready(Err(io::Error::other("no space left on device")));
        }
        let allowed = buf.len().min(usize::try_from(budget).unwrap_or(usize::MAX));

        let this = &mut *self;
        let result = Pin::new(&mut this.file).poll_write(cx, &buf[..allowed]);
        if let Poll::Ready(Ok(written)) = &result {
            this.budget.fetch_sub(*written as u64, Ordering::SeqCst);
        }
        result
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_shutdown(cx)
    }
}

impl AsyncSeek for BudgetedOutput {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.file).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.file).poll_complete(cx)
    }
}

#[async_trait]
impl AviOutput for BudgetedOutput {
    async fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len).await
    }

    async fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all().await
    }
}
