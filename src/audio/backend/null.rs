//! Null backend - a virtual device clocked by wall time
//!
//! Queued frames drain at the sample rate while started and are then
//! thrown away. The wait returns on an explicit signal or after one
//! device period, whichever comes first.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{frames_for_duration, AudioBackend, BackendError, StreamFormat};
use crate::audio::signal::SpaceSignal;
use crate::settings::AudioSettings;

/// Device periods per queue length
const PERIODS_PER_BUFFER: u32 = 4;

pub struct NullBackend {
    sample_rate: u32,
    channels: u16,
    buffer_duration_ms: u32,

    signal: Arc<SpaceSignal>,
    format: Option<StreamFormat>,
    staging: Vec<i16>,
    /// Frames queued as of `last_tick`
    queued: u32,
    /// Last time the queue was drained, `None` while stopped
    last_tick: Option<Instant>,
    frames_rendered: u64,
}

impl NullBackend {
    pub fn new(settings: &AudioSettings) -> Self {
        Self {
            sample_rate: settings.sample_rate.max(1),
            channels: settings.channels.max(1),
            buffer_duration_ms: settings.buffer_duration_ms,
            signal: Arc::new(SpaceSignal::new()),
            format: None,
            staging: Vec::new(),
            queued: 0,
            last_tick: None,
            frames_rendered: 0,
        }
    }

    /// Frames consumed since creation
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    fn period(&self) -> Duration {
        Duration::from_millis((self.buffer_duration_ms / PERIODS_PER_BUFFER).max(1) as u64)
    }

    /// Play out whatever the elapsed time covers
    fn advance(&mut self) {
        let Some(last) = self.last_tick else {
            return;
        };
        let now = Instant::now();
        let elapsed = (now.duration_since(last).as_secs_f64() * self.sample_rate as f64) as u64;
        if elapsed == 0 {
            return;
        }

        let played = elapsed.min(self.queued as u64) as u32;
        self.queued -= played;
        self.frames_rendered += played as u64;
        self.last_tick = Some(now);
    }
}

impl AudioBackend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn initialize(&mut self) -> Result<StreamFormat, BackendError> {
        let format = StreamFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            buffer_frames: frames_for_duration(self.sample_rate, self.buffer_duration_ms),
        };
        self.staging = vec![0; format.samples(format.buffer_frames)];
        self.format = Some(format);

        log::info!(
            "Null device: {} Hz, {} channels, {} frame queue",
            format.sample_rate,
            format.channels,
            format.buffer_frames
        );
        Ok(format)
    }

    fn space_signal(&self) -> Arc<SpaceSignal> {
        Arc::clone(&self.signal)
    }

    fn queued_frames(&mut self) -> Result<u32, BackendError> {
        if self.format.is_none() {
            return Err(BackendError::NotInitialized);
        }
        self.advance();
        Ok(self.queued)
    }

    fn get_buffer(&mut self, frames: u32) -> Option<&mut [i16]> {
        let format = self.format?;
        self.advance();
        if frames > format.buffer_frames - self.queued {
            return None;
        }
        Some(&mut self.staging[..format.samples(frames)])
    }

    fn commit(&mut self, frames: u32) {
        if let Some(format) = self.format {
            self.queued = (self.queued + frames).min(format.buffer_frames);
        }
    }

    fn wait_for_space(&mut self) {
        self.signal.wait_timeout(self.period());
    }

    fn start(&mut self) -> Result<(), BackendError> {
        if self.format.is_none() {
            return Err(BackendError::NotInitialized);
        }
        self.last_tick = Some(Instant::now());
        Ok(())
    }

    fn stop(&mut self) {
        self.advance();
        self.last_tick = None;
        log::info!("Null device stopped after {} frames", self.frames_rendered);
    }
}
