//! Refill loop - keeps the backend's playback queue full
//!
//! Runs on the dedicated feeder thread. Each time the backend signals free
//! space, the feeder works out how many frames are missing, asks the
//! application callback to produce that many samples into the ring buffer,
//! then converts them to 16-bit PCM straight into the backend's region.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::backend::{AudioBackend, BackendError, StreamFormat};
use super::buffer::RingBuffer;

/// Application audio callback
///
/// Called with the ring buffer, the negotiated format, and the number of
/// interleaved samples needed. It must return only once at least that many
/// samples are readable from the ring's read cursor.
pub type AudioCallback = Box<dyn FnMut(&RingBuffer, StreamFormat, usize) + Send>;

/// What a single refill did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefillOutcome {
    /// Nothing was missing
    Idle,
    /// The backend declined; wait for the next signal
    Skipped,
    /// This many frames were committed
    Submitted(u32),
}

pub struct Feeder {
    backend: Box<dyn AudioBackend>,
    format: StreamFormat,
    ring: Arc<RingBuffer>,
    callback: AudioCallback,
    done: Arc<AtomicBool>,
}

impl Feeder {
    /// # Arguments
    /// * `backend` - An initialized backend
    /// * `format` - The format its `initialize()` returned
    /// * `done` - Shutdown flag, checked once per iteration
    pub fn new(
        backend: Box<dyn AudioBackend>,
        format: StreamFormat,
        ring: Arc<RingBuffer>,
        callback: AudioCallback,
        done: Arc<AtomicBool>,
    ) -> Self {
        Self {
            backend,
            format,
            ring,
            callback,
            done,
        }
    }

    /// Submit a full queue, then start playback
    pub fn prime(&mut self) -> Result<(), BackendError> {
        self.refill(self.format.buffer_frames);
        self.backend.start()
    }

    /// Top up the queue by whatever the device has played
    pub fn step(&mut self) -> RefillOutcome {
        match self.backend.queued_frames() {
            Ok(padding) => self.refill(self.format.buffer_frames.saturating_sub(padding)),
            Err(e) => {
                log::debug!("Skipping refill: {}", e);
                RefillOutcome::Skipped
            }
        }
    }

    /// Fill and commit exactly `frames` frames
    ///
    /// Zero frames is a no-op: no callback, no cursor movement.
    pub fn refill(&mut self, frames: u32) -> RefillOutcome {
        if frames == 0 {
            return RefillOutcome::Idle;
        }
        let samples = self.format.samples(frames);

        let Some(region) = self.backend.get_buffer(frames) else {
            log::debug!("Backend declined a {} frame region", frames);
            return RefillOutcome::Skipped;
        };

        (self.callback)(&self.ring, self.format, samples);

        let available = self.ring.available_samples();
        if available < samples {
            log::warn!(
                "Audio callback left {} of {} samples, playing stale data",
                available,
                samples
            );
        }

        for slot in region.iter_mut().take(samples) {
            *slot = self.ring.read_sample();
        }

        self.backend.commit(frames);
        log::trace!("Committed {} frames", frames);
        RefillOutcome::Submitted(frames)
    }

    /// Wait-and-refill until the shutdown flag is set, then stop the backend
    pub fn run(mut self) {
        log::info!(
            "Audio feeder running on the {} backend",
            self.backend.name()
        );

        while !self.done.load(Ordering::Acquire) {
            self.backend.wait_for_space();
            // Shutdown also raises the signal; don't commit after it
            if self.done.load(Ordering::Acquire) {
                break;
            }
            self.step();
        }

        self.backend.stop();
        log::info!("Audio feeder stopped");
    }
}
