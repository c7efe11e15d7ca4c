use carbus::codec::{CanId, Frame, Signal};
use carbus::frame_log::{FrameLog, FRAME_LOG_CAPACITY};

fn speed_frame(timestamp_ms: u64) -> Frame {
    Signal::vehicle_speed(timestamp_ms as f64 / 10.0).encode(timestamp_ms)
}

#[test]
fn test_eviction_drops_oldest_at_capacity() {
    let mut log = FrameLog::new();
    for timestamp in 0..(FRAME_LOG_CAPACITY as u64 + 5) {
        assert!(log.append(speed_frame(timestamp)));
    }

    assert_eq!(log.len(), FRAME_LOG_CAPACITY);
    let newest = log.iter().next().unwrap();
    let oldest = log.iter().last().unwrap();
    assert_eq!(newest.timestamp_ms(), FRAME_LOG_CAPACITY as u64 + 4);
    assert_eq!(oldest.timestamp_ms(), 5);
    assert_eq!(log.stats().evicted, 5);
    assert_eq!(log.stats().appended, FRAME_LOG_CAPACITY as u64 + 5);
}

#[test]
fn test_custom_limit_evicts_earlier() {
    let mut log = FrameLog::with_limit(3);
    for timestamp in 1..=5 {
        log.append(speed_frame(timestamp));
    }

    let timestamps: Vec<u64> = log.iter().map(Frame::timestamp_ms).collect();
    assert_eq!(timestamps, vec![5, 4, 3]);
}

#[test]
fn test_paused_log_keeps_contents_and_drops_new_frames() {
    let mut log = FrameLog::new();
    log.append(speed_frame(1));
    log.append(speed_frame(2));

    log.pause();
    assert!(log.is_paused());
    assert!(!log.append(speed_frame(3)));
    assert!(!log.append(speed_frame(4)));

    assert_eq!(log.len(), 2);
    assert_eq!(log.stats().discarded_while_paused, 2);

    log.resume();
    assert!(log.append(speed_frame(5)));
    let timestamps: Vec<u64> = log.iter().map(Frame::timestamp_ms).collect();
    assert_eq!(timestamps, vec![5, 2, 1]);
}

#[test]
fn test_clear_works_while_paused() {
    let mut log = FrameLog::new();
    log.append(speed_frame(1));
    log.pause();
    log.clear();

    assert!(log.is_empty());
    assert!(log.is_paused());
    assert_eq!(log.stats().clears, 1);
}

#[test]
fn test_snapshot_is_coherent_copy() {
    let mut log = FrameLog::new();
    log.append(Frame::padded(CanId::ENGINE_RPM, 10, &[0x03, 0x20]));
    log.append(speed_frame(20));
    log.pause();

    let snapshot = log.snapshot();
    assert_eq!(snapshot.message_count, 2);
    assert!(snapshot.paused);
    assert_eq!(snapshot.revision, log.revision());
    assert_eq!(snapshot.frames[0].timestamp_ms(), 20);

    let described = snapshot.describe();
    assert_eq!(described[1].name, "ENGINE_RPM");
    assert_eq!(described[1].detail.as_deref(), Some("RPM: 800"));

    // Later mutation does not reach an existing snapshot
    log.clear();
    assert_eq!(snapshot.frames.len(), 2);
}

#[test]
fn test_latest_respects_count() {
    let mut log = FrameLog::new();
    for timestamp in 0..10 {
        log.append(speed_frame(timestamp));
    }

    let latest = log.latest(3);
    let timestamps: Vec<u64> = latest.iter().map(Frame::timestamp_ms).collect();
    assert_eq!(timestamps, vec![9, 8, 7]);
    assert_eq!(log.latest(100).len(), 10);
}

#[test]
fn test_resume_without_pause_is_a_no_op() {
    let mut log = FrameLog::new();
    let revision = log.revision();
    log.resume();
    assert_eq!(log.revision(), revision);
    assert!(!log.is_paused());
}
