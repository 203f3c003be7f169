//! Capture-and-persist pipeline.
//!
//! One invocation per wake cycle: acquire a frame, snapshot the clock, write
//! the frame to its time-derived destination with bounded retries, and hand
//! the frame buffer back by letting the borrow end.

use log::{debug, info, warn};

use crate::camera::CameraDevice;
use crate::clock::WallClock;
use crate::naming::{self, PhotoPath};
use crate::retry::Bounded;
use crate::store::{FrameSink, PhotoStore};

/// Write granularity for frame persistence and photo serving.
pub const CHUNK_BYTES: usize = 4096;
/// Chunks between flushes during a frame write.
pub const FLUSH_EVERY_CHUNKS: usize = 8;
/// Full-write attempts before reporting `WriteExhausted`.
pub const WRITE_ATTEMPTS: u8 = 3;
/// Bucket create-and-verify attempts before the root fallback.
pub const BUCKET_ATTEMPTS: u8 = 3;

/// Successful capture summary; consumed for logging and cycle bookkeeping.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CaptureOutcome {
    pub destination: PhotoPath,
    pub bytes_written: u64,
    pub attempts: u8,
}

/// Why a capture produced no stored photo.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PipelineError {
    /// The camera driver returned no frame. Not retried.
    NoFrame,
    /// The wall clock has not been synced; no destination can be named.
    ClockUnset,
    /// Every write attempt ended with a byte-count mismatch or sink error.
    /// A partial file may remain at the destination.
    WriteExhausted {
        destination: PhotoPath,
        attempts: u8,
    },
}

enum WriteAttemptError {
    /// The sink accepted fewer bytes than the frame holds.
    Mismatch { written: u64 },
    /// The sink failed outright; opening, writing, flushing, or closing.
    Sink,
}

/// Run one capture: returns the stored destination or the reason there is
/// none. The frame borrow is released when this function returns, on every
/// path.
pub fn capture_and_store<C, S, K>(
    camera: &mut C,
    store: &mut S,
    clock: &K,
) -> Result<CaptureOutcome, PipelineError>
where
    C: CameraDevice,
    S: PhotoStore,
    K: WallClock,
{
    let frame = match camera.capture() {
        Ok(frame) => frame,
        Err(err) => {
            warn!("capture: no frame from driver: {err:?}");
            return Err(PipelineError::NoFrame);
        }
    };

    // Name from the moment of capture, before any storage I/O.
    let Some(now) = clock.now() else {
        warn!("capture: clock not synced, dropping frame");
        return Err(PipelineError::ClockUnset);
    };

    // Camera and storage share board wiring; one storage re-init absorbs the
    // post-capture hiccup. Best effort, independent of the retry budgets.
    if let Err(err) = store.reinit() {
        warn!("capture: storage stabilization failed: {err:?}");
    }

    let bucket = naming::bucket_name(now.year, now.day_of_year);
    let ensured = Bounded::new(BUCKET_ATTEMPTS).run(|attempt| {
        if let Err(err) = store.make_bucket(&bucket) {
            debug!("capture: bucket create attempt {attempt}: {err:?}");
        }
        match store.bucket_exists(&bucket) {
            Ok(true) => Ok(()),
            Ok(false) => Err(()),
            Err(err) => {
                debug!("capture: bucket verify attempt {attempt}: {err:?}");
                Err(())
            }
        }
    });

    let destination = match ensured.result {
        Ok(()) => PhotoPath::compose(Some(&bucket), &now),
        Err(()) => {
            warn!(
                "capture: bucket {} unavailable after {} attempts, using root",
                bucket.as_str(),
                ensured.attempts
            );
            PhotoPath::compose(None, &now)
        }
    };

    let frame_len = frame.len() as u64;
    let written = Bounded::new(WRITE_ATTEMPTS).run(|attempt| {
        match write_frame(store, &destination, frame) {
            Ok(()) => Ok(()),
            Err(WriteAttemptError::Mismatch { written }) => {
                warn!(
                    "capture: attempt {attempt} wrote {written} of {frame_len} bytes to {destination}"
                );
                Err(())
            }
            Err(WriteAttemptError::Sink) => {
                warn!("capture: attempt {attempt} failed on storage error");
                Err(())
            }
        }
    });

    match written.result {
        Ok(()) => {
            info!(
                "capture: stored {destination} ({frame_len} bytes, attempt {})",
                written.attempts
            );
            Ok(CaptureOutcome {
                destination,
                bytes_written: frame_len,
                attempts: written.attempts,
            })
        }
        Err(()) => {
            warn!(
                "capture: giving up on {destination} after {} attempts, partial file may remain",
                written.attempts
            );
            Err(PipelineError::WriteExhausted {
                destination,
                attempts: written.attempts,
            })
        }
    }
}

/// One full write attempt: truncating open, chunked writes with periodic
/// flushes, close, then byte-count verification.
fn write_frame<S: PhotoStore>(
    store: &mut S,
    destination: &PhotoPath,
    frame: &[u8],
) -> Result<(), WriteAttemptError> {
    let mut sink = store
        .open_writer(destination)
        .map_err(|_| WriteAttemptError::Sink)?;

    let mut total: u64 = 0;
    for (index, chunk) in frame.chunks(CHUNK_BYTES).enumerate() {
        let accepted = sink.write(chunk).map_err(|_| WriteAttemptError::Sink)?;
        total += accepted as u64;
        if accepted < chunk.len() {
            // Short write; finish the attempt so the mismatch is counted.
            break;
        }
        if (index + 1) % FLUSH_EVERY_CHUNKS == 0 {
            sink.flush().map_err(|_| WriteAttemptError::Sink)?;
        }
    }
    sink.close().map_err(|_| WriteAttemptError::Sink)?;

    if total == frame.len() as u64 {
        Ok(())
    } else {
        Err(WriteAttemptError::Mismatch { written: total })
    }
}

#[cfg(test)]
mod tests;
