//! Ring buffer for handing float samples to the feeder thread
//!
//! The application writes interleaved `f32` samples; the feeder thread
//! reads them back one at a time and converts them to 16-bit PCM.
//!
//! ## Design Notes
//!
//! Capacity and both cursors are expressed in bytes (4 bytes per sample).
//! The cursors are independent: reading never checks how much was written.
//! The audio callback is trusted to have written enough before the feeder
//! reads. Storage and cursors are atomics so the producer and the consumer
//! can live on different threads without a lock.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default ring capacity: 128 KiB, i.e. 32768 samples
pub const DEFAULT_CAPACITY_BYTES: usize = 128 * 1024;

/// Size of one stored sample in bytes
pub const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

/// Scale applied when converting a float sample to 16-bit PCM
const I16_SCALE: f32 = 32767.0;

/// Errors that can occur when creating or writing the ring buffer
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("Ring buffer capacity must be non-zero")]
    ZeroCapacity,

    #[error("Ring buffer capacity {0} is not a multiple of 4 bytes")]
    UnalignedCapacity(usize),

    #[error("Write of {0} bytes is not a multiple of 4 bytes")]
    UnalignedWrite(usize),

    #[error("Ring buffer of {capacity} bytes can't hold a {needed} byte device queue")]
    TooSmall { capacity: usize, needed: usize },
}

/// How out-of-range floats are turned into 16-bit integers
///
/// Inside [-1, 1] both policies produce `trunc(x * 32767)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleConversion {
    /// Truncate toward zero and keep the low 16 bits (two's-complement wrap).
    /// `2.0` becomes `-2`.
    #[default]
    Wrap,
    /// Clamp to [-1, 1] before scaling. `2.0` becomes `32767`.
    Clamp,
}

impl SampleConversion {
    /// Convert one float sample to 16-bit PCM
    #[inline]
    pub fn convert(self, value: f32) -> i16 {
        match self {
            // `as i32` truncates toward zero, `as i16` keeps the low 16 bits
            Self::Wrap => (value * I16_SCALE) as i32 as i16,
            Self::Clamp => (value.clamp(-1.0, 1.0) * I16_SCALE) as i16,
        }
    }
}

/// Fixed-capacity circular store of interleaved `f32` samples
///
/// One producer (the application) calls [`write`](Self::write); one
/// consumer (the feeder thread) calls [`read_sample`](Self::read_sample).
/// Share it between them behind an `Arc`.
pub struct RingBuffer {
    /// One slot per sample, holding the `f32` bit pattern
    slots: Box<[AtomicU32]>,
    /// Capacity in bytes
    capacity: usize,
    /// Byte offset of the next sample to read
    read_location: AtomicUsize,
    /// Byte offset of the next sample to write
    write_location: AtomicUsize,
    conversion: SampleConversion,
}

impl RingBuffer {
    /// Create a zero-filled ring buffer
    ///
    /// # Arguments
    /// * `capacity` - Size in bytes, a non-zero multiple of 4
    /// * `conversion` - Policy used by [`read_sample`](Self::read_sample)
    pub fn new(capacity: usize, conversion: SampleConversion) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        if capacity % SAMPLE_BYTES != 0 {
            return Err(BufferError::UnalignedCapacity(capacity));
        }

        let slots = (0..capacity / SAMPLE_BYTES)
            .map(|_| AtomicU32::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            slots,
            capacity,
            read_location: AtomicUsize::new(0),
            write_location: AtomicUsize::new(0),
            conversion,
        })
    }

    /// Capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Policy applied by [`read_sample`](Self::read_sample)
    pub fn conversion(&self) -> SampleConversion {
        self.conversion
    }

    /// Check that `samples` unread samples fit without the write cursor
    /// catching up with the read cursor
    ///
    /// A full ring is indistinguishable from an empty one, so the ring must
    /// be strictly larger than the largest refill.
    pub fn ensure_room(&self, samples: usize) -> Result<(), BufferError> {
        let needed = samples * SAMPLE_BYTES;
        if needed >= self.capacity {
            return Err(BufferError::TooSmall {
                capacity: self.capacity,
                needed,
            });
        }
        Ok(())
    }

    /// Current read cursor (byte offset)
    pub fn read_location(&self) -> usize {
        self.read_location.load(Ordering::Relaxed)
    }

    /// Current write cursor (byte offset)
    pub fn write_location(&self) -> usize {
        self.write_location.load(Ordering::Acquire)
    }

    /// Number of samples between the read and the write cursor
    ///
    /// A completely full ring looks empty; keep writes well below capacity.
    pub fn available_samples(&self) -> usize {
        let read = self.read_location.load(Ordering::Relaxed);
        let write = self.write_location.load(Ordering::Acquire);
        ((write + self.capacity - read) % self.capacity) / SAMPLE_BYTES
    }

    /// Append samples at the write cursor, wrapping at capacity
    ///
    /// Called from the producer side only. Older unread samples are
    /// overwritten if the producer laps the reader.
    pub fn write(&self, samples: &[f32]) {
        let mut pos = self.write_location.load(Ordering::Relaxed);
        for &sample in samples {
            self.slots[pos / SAMPLE_BYTES].store(sample.to_bits(), Ordering::Relaxed);
            pos = self.advance(pos);
        }
        self.write_location.store(pos, Ordering::Release);
    }

    /// Append raw native-endian `f32` bytes at the write cursor
    pub fn write_bytes(&self, bytes: &[u8]) -> Result<(), BufferError> {
        if bytes.len() % SAMPLE_BYTES != 0 {
            return Err(BufferError::UnalignedWrite(bytes.len()));
        }

        let mut pos = self.write_location.load(Ordering::Relaxed);
        for chunk in bytes.chunks_exact(SAMPLE_BYTES) {
            let bits = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            self.slots[pos / SAMPLE_BYTES].store(bits, Ordering::Relaxed);
            pos = self.advance(pos);
        }
        self.write_location.store(pos, Ordering::Release);
        Ok(())
    }

    /// Pop the float at the read cursor
    #[inline]
    pub fn read_f32(&self) -> f32 {
        let pos = self.read_location.load(Ordering::Relaxed);
        let value = f32::from_bits(self.slots[pos / SAMPLE_BYTES].load(Ordering::Relaxed));
        self.read_location.store(self.advance(pos), Ordering::Relaxed);
        value
    }

    /// Pop the float at the read cursor and convert it to 16-bit PCM
    ///
    /// Unchecked hot path: does not look at the write cursor.
    #[inline]
    pub fn read_sample(&self) -> i16 {
        self.conversion.convert(self.read_f32())
    }

    #[inline]
    fn advance(&self, pos: usize) -> usize {
        let next = pos + SAMPLE_BYTES;
        if next >= self.capacity {
            0
        } else {
            next
        }
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("read_location", &self.read_location())
            .field("write_location", &self.write_location())
            .field("conversion", &self.conversion)
            .finish()
    }
}
