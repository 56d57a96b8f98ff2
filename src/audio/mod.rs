//! Audio module - feeds application samples to the output device
//!
//! This module provides:
//! - Ring buffer the application writes float samples into
//! - Refill loop that keeps the device queue full
//! - Backends for real hardware (cpal) and a null device
//! - Audio system that ties them together on a dedicated thread

pub mod backend;
mod buffer;
mod engine;
mod feeder;
mod signal;

// Re-export public types
pub use backend::{AudioBackend, BackendError, BackendKind, StreamFormat};
pub use buffer::{BufferError, RingBuffer, SampleConversion, DEFAULT_CAPACITY_BYTES};
pub use engine::{AudioError, AudioSystem, BackendFactory};
pub use feeder::{AudioCallback, Feeder, RefillOutcome};
pub use signal::SpaceSignal;
