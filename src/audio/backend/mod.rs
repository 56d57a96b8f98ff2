//! Audio backends - the hardware side of the feeder
//!
//! A backend owns a playback queue measured in frames. The feeder asks how
//! much of it is still queued, borrows a region to fill, commits it, and
//! sleeps on the backend's space signal until the device has consumed more.
//!
//! Two implementations are provided:
//! - [`HardwareBackend`]: a real output device through cpal
//! - [`NullBackend`]: discards audio at the configured sample rate, for
//!   machines without an output device

mod hardware;
mod null;

#[cfg(test)]
pub(crate) mod mock;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::signal::SpaceSignal;
use crate::settings::AudioSettings;

pub use hardware::HardwareBackend;
pub use null::NullBackend;

/// Errors raised while opening or driving a backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("No output device found")]
    NoOutputDevice,

    #[error("Failed to query supported configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("Failed to get default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to build stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Failed to start stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Backend used before initialize()")]
    NotInitialized,

    #[error("Failed to query queued frames: {0}")]
    Padding(String),
}

/// Negotiated output format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    /// Interleaved channels per frame
    pub channels: u16,
    /// Total size of the playback queue in frames
    pub buffer_frames: u32,
}

impl StreamFormat {
    /// Number of interleaved samples in `frames` frames
    pub fn samples(&self, frames: u32) -> usize {
        frames as usize * self.channels as usize
    }
}

/// Which backend to open at startup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Hardware if an output device exists, otherwise null
    #[default]
    Auto,
    Hardware,
    Null,
}

/// The capability set the feeder needs from an output device
///
/// Backends are created and driven on the feeder thread, so they need not
/// be `Send`. Only the [`SpaceSignal`] crosses threads.
pub trait AudioBackend {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Open the device and negotiate the format
    fn initialize(&mut self) -> Result<StreamFormat, BackendError>;

    /// Signal raised whenever queue space becomes available
    fn space_signal(&self) -> Arc<SpaceSignal>;

    /// Frames queued to the device but not yet played (the padding)
    fn queued_frames(&mut self) -> Result<u32, BackendError>;

    /// Borrow a writable region of exactly `frames` frames
    ///
    /// # Returns
    /// `None` if the device can't provide that much right now
    fn get_buffer(&mut self, frames: u32) -> Option<&mut [i16]>;

    /// Hand the region from the last [`get_buffer`](Self::get_buffer) to the device
    fn commit(&mut self, frames: u32);

    /// Block until the device has consumed some of the queue
    fn wait_for_space(&mut self);

    fn start(&mut self) -> Result<(), BackendError>;

    fn stop(&mut self);
}

/// Pick a backend according to `settings.backend`
///
/// `Auto` probes the default host for an output device.
pub fn select(settings: &AudioSettings) -> Box<dyn AudioBackend> {
    match settings.backend {
        BackendKind::Hardware => Box::new(HardwareBackend::new(settings)),
        BackendKind::Null => Box::new(NullBackend::new(settings)),
        BackendKind::Auto => {
            if HardwareBackend::is_available() {
                Box::new(HardwareBackend::new(settings))
            } else {
                log::warn!("No output device available, falling back to the null backend");
                Box::new(NullBackend::new(settings))
            }
        }
    }
}

/// Frames in a queue of `duration_ms` at `sample_rate`, at least one
pub(crate) fn frames_for_duration(sample_rate: u32, duration_ms: u32) -> u32 {
    ((sample_rate as u64 * duration_ms as u64) / 1000).max(1) as u32
}
