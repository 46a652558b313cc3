use crate::{
    FfmpegWriter, FfmpegWriterFactory, Frame, SegmentSpec, SegmentWriter, WriterError,
    WriterFactory,
};

use std::path::Path;

use bytes::Bytes;
use image::{ExtendedColorType, codecs::jpeg::JpegEncoder};
use tokio::time::Instant;

fn spec(path: &Path, codec: &str) -> SegmentSpec {
    SegmentSpec {
        path: path.to_path_buf(),
        frame_rate: 10.0,
        width: 63,
        height: 47,
        codec: codec.to_string(),
        audio: None,
    }
}

/// A decodable baseline JPEG with a gradient that shifts with `shade`.
#[allow(clippy::unwrap_used)]
fn encoded_jpeg(width: u32, height: u32, shade: u8) -> Bytes {
    let pixels: Vec<u8> = (0..width * height)
        .flat_map(|i| {
            let x = (i % width) as u8;
            [x.wrapping_add(shade), shade, 255 - x]
        })
        .collect();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 80)
        .encode(&pixels, width, height, ExtendedColorType::Rgb8)
        .unwrap();
    Bytes::from(out)
}

fn ffmpeg_available() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Offset of the first top-level MP4 box named `kind`.
fn box_offset(data: &[u8], kind: &[u8; 4]) -> Option<usize> {
    let mut pos = 0;
    while pos + 8 <= data.len() {
        let size = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
        if &data[pos + 4..pos + 8] == kind {
            return Some(pos);
        }
        if size < 8 {
            return None;
        }
        pos += size as usize;
    }
    None
}

/// WHAT: The MP4 factory names segments `.mp4`
/// WHY: Output paths are built from the factory's extension
#[test]
fn given_ffmpeg_factory_when_asked_for_extension_then_mp4() {
    assert_eq!(FfmpegWriterFactory::default().extension(), "mp4");
}

/// WHAT: Only H.264 codec names are accepted
/// WHY: The ffmpeg writer always encodes with libx264
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_mjpeg_codec_when_opening_mp4_then_unsupported_codec() {
    // Given: A segment asking for MJPG
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.mp4");

    // When: Opening through the MP4 factory
    let result = FfmpegWriterFactory::default()
        .open(&spec(&path, "MJPG"))
        .await;

    // Then: Rejected before any process or file exists
    assert!(matches!(result, Err(WriterError::UnsupportedCodec { .. })));
    assert!(!path.exists());
}

/// WHAT: A missing ffmpeg binary surfaces as an open failure
/// WHY: The session must end with an error instead of waiting on a process that never ran
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_missing_ffmpeg_binary_when_opening_then_open_failed() {
    // Given: A factory pointing at a program that does not exist
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.mp4");
    let factory = FfmpegWriterFactory::new(dir.path().join("no-such-ffmpeg"));

    // When: Opening a segment
    let result = factory.open(&spec(&path, "H264")).await;

    // Then: OpenFailed and no output
    assert!(matches!(result, Err(WriterError::OpenFailed { .. })));
    assert!(!path.exists());
}

/// WHAT: An existing file is never handed to ffmpeg
/// WHY: Recordings must not overwrite earlier ones
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_existing_file_when_opening_mp4_then_open_failed_and_untouched() {
    // Given: A file already at the segment path
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.mp4");
    std::fs::write(&path, b"keep me").unwrap();

    // When: Opening over it
    let result = FfmpegWriter::spawn(Path::new("ffmpeg"), &spec(&path, "avc1")).await;

    // Then: Refused and the old contents survive
    assert!(matches!(result, Err(WriterError::OpenFailed { .. })));
    assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
}

/// WHAT: Frames piped through ffmpeg come out as a faststart MP4
/// WHY: The index must sit before the media data so the file plays while downloading
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_jpeg_frames_when_closing_mp4_then_moov_precedes_mdat() {
    if !ffmpeg_available() {
        return;
    }

    // Given: An MP4 writer and ten real JPEG frames of odd dimensions
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.mp4");
    let mut writer = FfmpegWriter::spawn(Path::new("ffmpeg"), &spec(&path, "H264"))
        .await
        .unwrap();

    // When: Writing them and closing
    for shade in 0..10u8 {
        let frame = Frame::from_jpeg(encoded_jpeg(63, 47, shade * 20), Instant::now()).unwrap();
        writer.write(&frame).await.unwrap();
    }
    writer.close().await.unwrap();

    // Then: A complete MP4 with moov ahead of mdat
    assert_eq!(writer.frames(), 10);
    let data = std::fs::read(&path).unwrap();
    assert_eq!(box_offset(&data, b"ftyp"), Some(0));
    let moov = box_offset(&data, b"moov").unwrap();
    let mdat = box_offset(&data, b"mdat").unwrap();
    assert!(moov < mdat);
}

/// WHAT: Writes after close are refused and a second close is a no-op
/// WHY: Segments are closed on every exit path, sometimes twice
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_closed_mp4_writer_when_writing_then_write_failed() {
    if !ffmpeg_available() {
        return;
    }

    // Given: A writer closed after one frame
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.mp4");
    let mut writer = FfmpegWriter::spawn(Path::new("ffmpeg"), &spec(&path, "H264"))
        .await
        .unwrap();
    let frame = Frame::from_jpeg(encoded_jpeg(63, 47, 0), Instant::now()).unwrap();
    writer.write(&frame).await.unwrap();
    writer.close().await.unwrap();

    // When: Writing again and closing again
    let write = writer.write(&frame).await;
    let close = writer.close().await;

    // Then: The write fails and the close is quiet
    assert!(matches!(write, Err(WriterError::WriteFailed { .. })));
    assert!(close.is_ok());
    assert_eq!(writer.frames(), 1);
}
