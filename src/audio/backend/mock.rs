//! Scripted backend for feeder and engine tests

use std::sync::{Arc, Mutex};

use super::{AudioBackend, BackendError, StreamFormat};
use crate::audio::signal::SpaceSignal;

/// State shared between a [`MockBackend`] and the test driving it
#[derive(Debug, Default)]
pub(crate) struct MockState {
    /// Padding reported by `queued_frames()`
    pub queued: u32,
    /// Makes `get_buffer()` decline every request
    pub unavailable: bool,
    pub fail_padding: bool,
    pub fail_initialize: bool,
    /// Frame counts passed to `commit()`
    pub commits: Vec<u32>,
    /// Every sample committed, in order
    pub committed_samples: Vec<i16>,
    pub started: bool,
    pub stopped: bool,
}

pub(crate) struct MockBackend {
    state: Arc<Mutex<MockState>>,
    signal: Arc<SpaceSignal>,
    format: StreamFormat,
    staging: Vec<i16>,
}

impl MockBackend {
    pub fn new(format: StreamFormat) -> (Self, Arc<Mutex<MockState>>, Arc<SpaceSignal>) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let signal = Arc::new(SpaceSignal::new());
        let backend = Self {
            state: Arc::clone(&state),
            signal: Arc::clone(&signal),
            format,
            staging: Vec::new(),
        };
        (backend, state, signal)
    }
}

impl AudioBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn initialize(&mut self) -> Result<StreamFormat, BackendError> {
        if self.state.lock().unwrap().fail_initialize {
            return Err(BackendError::NoOutputDevice);
        }
        Ok(self.format)
    }

    fn space_signal(&self) -> Arc<SpaceSignal> {
        Arc::clone(&self.signal)
    }

    fn queued_frames(&mut self) -> Result<u32, BackendError> {
        let state = self.state.lock().unwrap();
        if state.fail_padding {
            return Err(BackendError::Padding("scripted failure".to_string()));
        }
        Ok(state.queued)
    }

    fn get_buffer(&mut self, frames: u32) -> Option<&mut [i16]> {
        if self.state.lock().unwrap().unavailable {
            return None;
        }
        self.staging = vec![0; self.format.samples(frames)];
        Some(&mut self.staging)
    }

    fn commit(&mut self, frames: u32) {
        let mut state = self.state.lock().unwrap();
        state.commits.push(frames);
        state.committed_samples.extend_from_slice(&self.staging);
        state.queued = (state.queued + frames).min(self.format.buffer_frames);
    }

    fn wait_for_space(&mut self) {
        self.signal.wait();
    }

    fn start(&mut self) -> Result<(), BackendError> {
        self.state.lock().unwrap().started = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.state.lock().unwrap().stopped = true;
    }
}
