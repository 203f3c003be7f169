use super::*;
use crate::camera::CameraDevice;
use crate::clock::{UtcTime, WallClock};
use crate::store::mock::MemoryStore;

// 2025-08-23 14:30:05 UTC; bucket 2025_W34, file 2025_08_23_14_30.jpg.
const CAPTURE_UNIX: u64 = 1_755_959_405;
const BUCKETED: &str = "/2025_W34/2025_08_23_14_30.jpg";
const ROOTED: &str = "/2025_08_23_14_30.jpg";

struct ScriptedCamera {
    frame: Vec<u8>,
    refuse: bool,
    captures: u32,
}

impl ScriptedCamera {
    fn with_frame(len: usize) -> Self {
        Self {
            frame: (0..len).map(|index| (index % 249) as u8).collect(),
            refuse: false,
            captures: 0,
        }
    }

    fn refusing() -> Self {
        Self {
            frame: Vec::new(),
            refuse: true,
            captures: 0,
        }
    }
}

impl CameraDevice for ScriptedCamera {
    type Error = &'static str;

    fn capture(&mut self) -> Result<&[u8], Self::Error> {
        self.captures += 1;
        if self.refuse {
            Err("no buffer")
        } else {
            Ok(&self.frame)
        }
    }
}

struct FixedClock(Option<UtcTime>);

impl FixedClock {
    fn synced() -> Self {
        Self(Some(UtcTime::from_unix(CAPTURE_UNIX)))
    }

    fn unset() -> Self {
        Self(None)
    }
}

impl WallClock for FixedClock {
    fn now(&self) -> Option<UtcTime> {
        self.0
    }
}

#[test]
fn clean_run_stores_into_the_bucket() {
    let mut camera = ScriptedCamera::with_frame(10_000);
    let mut store = MemoryStore::new();
    let clock = FixedClock::synced();

    let outcome = capture_and_store(&mut camera, &mut store, &clock).unwrap();

    assert_eq!(outcome.destination.as_str(), BUCKETED);
    assert_eq!(outcome.bytes_written, 10_000);
    assert_eq!(outcome.attempts, 1);
    assert!(store.has_bucket("2025_W34"));
    assert_eq!(store.bytes_of(BUCKETED).unwrap(), camera.frame.as_slice());
    assert_eq!(store.reinit_calls, 1);
}

#[test]
fn bucket_exhaustion_falls_back_to_root() {
    let mut camera = ScriptedCamera::with_frame(6_000);
    let mut store = MemoryStore::new();
    store.ghost_buckets = true;
    let clock = FixedClock::synced();

    let outcome = capture_and_store(&mut camera, &mut store, &clock).unwrap();

    assert_eq!(outcome.destination.as_str(), ROOTED);
    assert_eq!(store.bytes_of(ROOTED).unwrap().len(), 6_000);
    assert_eq!(store.bucket_create_calls, u32::from(BUCKET_ATTEMPTS));
    assert_eq!(store.bucket_verify_calls, u32::from(BUCKET_ATTEMPTS));
}

#[test]
fn bucket_fallback_is_reproducible() {
    for _ in 0..2 {
        let mut camera = ScriptedCamera::with_frame(512);
        let mut store = MemoryStore::new();
        store.ghost_buckets = true;
        let clock = FixedClock::synced();
        let outcome = capture_and_store(&mut camera, &mut store, &clock).unwrap();
        assert_eq!(outcome.destination.as_str(), ROOTED);
    }
}

#[test]
fn short_write_is_retried_and_recovers() {
    let mut camera = ScriptedCamera::with_frame(10_000);
    let mut store = MemoryStore::new();
    // Attempt 1 accepts only 5000 bytes; attempt 2 is unrestricted.
    store.write_limits.push(5_000).unwrap();
    let clock = FixedClock::synced();

    let outcome = capture_and_store(&mut camera, &mut store, &clock).unwrap();

    assert_eq!(outcome.bytes_written, 10_000);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(store.bytes_of(BUCKETED).unwrap(), camera.frame.as_slice());
}

#[test]
fn persistent_short_writes_exhaust_and_leave_partial_file() {
    let mut camera = ScriptedCamera::with_frame(10_000);
    let mut store = MemoryStore::new();
    for _ in 0..3 {
        store.write_limits.push(5_000).unwrap();
    }
    let clock = FixedClock::synced();

    let err = capture_and_store(&mut camera, &mut store, &clock).unwrap_err();

    match err {
        PipelineError::WriteExhausted {
            destination,
            attempts,
        } => {
            assert_eq!(destination.as_str(), BUCKETED);
            assert_eq!(attempts, WRITE_ATTEMPTS);
        }
        other => panic!("unexpected pipeline result: {other:?}"),
    }
    assert_eq!(store.writer_opens, u32::from(WRITE_ATTEMPTS));
    // No cleanup of the partial result.
    assert_eq!(store.bytes_of(BUCKETED).unwrap().len(), 5_000);
}

#[test]
fn failed_writer_open_consumes_one_attempt() {
    let mut camera = ScriptedCamera::with_frame(2_000);
    let mut store = MemoryStore::new();
    store.fail_writer_opens = 1;
    let clock = FixedClock::synced();

    let outcome = capture_and_store(&mut camera, &mut store, &clock).unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(store.bytes_of(BUCKETED).unwrap().len(), 2_000);
}

#[test]
fn camera_refusal_touches_no_storage() {
    let mut camera = ScriptedCamera::refusing();
    let mut store = MemoryStore::new();
    let clock = FixedClock::synced();

    let err = capture_and_store(&mut camera, &mut store, &clock).unwrap_err();

    assert_eq!(err, PipelineError::NoFrame);
    assert_eq!(store.storage_calls, 0);
}

#[test]
fn unsynced_clock_drops_the_frame_before_storage() {
    let mut camera = ScriptedCamera::with_frame(1_000);
    let mut store = MemoryStore::new();
    let clock = FixedClock::unset();

    let err = capture_and_store(&mut camera, &mut store, &clock).unwrap_err();

    assert_eq!(err, PipelineError::ClockUnset);
    assert_eq!(store.storage_calls, 0);
    assert_eq!(camera.captures, 1);
}

#[test]
fn stabilization_failure_does_not_abort_the_write() {
    let mut camera = ScriptedCamera::with_frame(3_000);
    let mut store = MemoryStore::new();
    store.fail_reinits = 1;
    let clock = FixedClock::synced();

    let outcome = capture_and_store(&mut camera, &mut store, &clock).unwrap();

    assert_eq!(outcome.bytes_written, 3_000);
    assert_eq!(store.reinit_calls, 1);
}

#[test]
fn same_minute_capture_overwrites_the_previous_file() {
    let mut camera = ScriptedCamera::with_frame(4_000);
    let mut store = MemoryStore::new();
    store.insert_bucket("2025_W34");
    store.seed_photo(BUCKETED, 100);
    let clock = FixedClock::synced();

    let outcome = capture_and_store(&mut camera, &mut store, &clock).unwrap();

    assert_eq!(outcome.destination.as_str(), BUCKETED);
    assert_eq!(store.bytes_of(BUCKETED).unwrap().len(), 4_000);
    assert_eq!(store.file_count(), 1);
}

#[test]
fn consecutive_cycles_reuse_the_camera() {
    let mut camera = ScriptedCamera::with_frame(1_500);
    let mut store = MemoryStore::new();
    let clock = FixedClock::synced();

    capture_and_store(&mut camera, &mut store, &clock).unwrap();
    capture_and_store(&mut camera, &mut store, &clock).unwrap();

    assert_eq!(camera.captures, 2);
}
