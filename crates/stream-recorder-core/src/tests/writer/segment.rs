use crate::{
    AviWriterFactory, Segment, SegmentRecord, SegmentSpec, WriterError,
    tests::support::{assert_playable, frame_at},
};

use tokio::time::Instant;

/// WHAT: A segment rejects writes once closed and closes only once
/// WHY: Finalized files must never be appended to
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_closed_segment_when_writing_then_closed_error() {
    // Given: A segment with two frames, closed
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("segment_0.avi");
    let base = Instant::now();
    let spec = SegmentSpec {
        path: path.clone(),
        frame_rate: 20.0,
        width: 64,
        height: 48,
        codec: "MJPG".to_string(),
        audio: None,
    };
    let mut segment = Segment::open(&AviWriterFactory, 0, spec, base).await.unwrap();
    segment.write(&frame_at(base, 0)).await.unwrap();
    segment.write(&frame_at(base, 50)).await.unwrap();
    segment.close().await.unwrap();

    // When: Writing and closing again
    let write = segment.write(&frame_at(base, 100)).await;
    let close = segment.close().await;

    // Then: The write is rejected and the record reflects two frames
    assert!(matches!(write, Err(WriterError::Closed { index: 0, .. })));
    assert!(close.is_ok());
    assert!(!segment.is_open());
    assert_eq!(segment.started_at(), base);
    assert_eq!(
        segment.record(),
        SegmentRecord {
            index: 0,
            path: path.clone(),
            frames: 2,
            finalized: true,
        }
    );
    assert_eq!(assert_playable(&path), 2);
}
