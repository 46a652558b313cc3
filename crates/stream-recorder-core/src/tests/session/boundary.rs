use crate::{BoundaryClock, BoundaryPolicy, session_tag};

use std::{path::Path, time::Duration};

use tokio::time::Instant;
use uuid::Uuid;

/// WHAT: Rotation triggers once a segment spans the configured duration
/// WHY: Segment length is measured from the frame that opened it
#[test]
fn given_rotating_policy_when_duration_reached_then_rotate() {
    // Given: A 10 s rotating clock started at `start`
    let mut clock = BoundaryClock::new(&BoundaryPolicy::rotating(Duration::from_secs(10)));
    let start = Instant::now();
    clock.reset(start);

    // When/Then: Below the duration it keeps the segment, at it rotates
    assert!(!clock.should_rotate(start + Duration::from_millis(9_999)));
    assert!(clock.should_rotate(start + Duration::from_secs(10)));
    assert_eq!(clock.elapsed(start + Duration::from_secs(3)), Duration::from_secs(3));
}

#[test]
fn given_clock_not_started_when_checking_then_no_rotation() {
    let clock = BoundaryClock::new(&BoundaryPolicy::rotating(Duration::from_secs(1)));

    assert!(!clock.should_rotate(Instant::now() + Duration::from_secs(60)));
    assert_eq!(clock.elapsed(Instant::now()), Duration::ZERO);
}

#[test]
fn given_single_policy_when_any_time_passes_then_never_rotates() {
    let mut clock = BoundaryClock::new(&BoundaryPolicy::Single);
    let start = Instant::now();
    clock.reset(start);

    assert!(!clock.should_rotate(start + Duration::from_secs(3600)));
}

#[test]
fn given_policies_when_naming_segments_then_layout_matches_policy() {
    let dir = Path::new("/data/recordings");
    let id = Uuid::from_u128(0x0189_6d2c_5a00_7000_8000_0000_dead_beef);
    let tag = session_tag(1_700_000_000_123, id);

    let single = BoundaryPolicy::Single.segment_path(dir, &tag, 0, "avi");
    let rotating =
        BoundaryPolicy::rotating(Duration::from_secs(10)).segment_path(dir, &tag, 3, "avi");

    assert_eq!(tag, "1700000000123_deadbeef");
    assert_eq!(single, dir.join("stream_1700000000123_deadbeef.avi"));
    assert_eq!(
        rotating,
        dir.join("session_1700000000123_deadbeef")
            .join("segment_3.avi")
    );
}

/// WHAT: Two sessions started in the same millisecond get distinct paths
/// WHY: Segments are created exclusively, so a shared path would fail the second session
#[test]
fn given_sessions_started_in_same_millisecond_when_naming_then_paths_differ() {
    // Given: Two fresh session ids and one timestamp
    let dir = Path::new("/data/recordings");
    let epoch_ms = 1_700_000_000_123;
    let first = session_tag(epoch_ms, Uuid::now_v7());
    let second = session_tag(epoch_ms, Uuid::now_v7());

    // When: Naming the single-file output of each
    let first_path = BoundaryPolicy::Single.segment_path(dir, &first, 0, "avi");
    let second_path = BoundaryPolicy::Single.segment_path(dir, &second, 0, "avi");

    // Then: They do not collide
    assert_ne!(first_path, second_path);
}
