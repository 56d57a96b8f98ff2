//! Audio system - owns the ring buffer and the feeder thread
//!
//! This is the engine-facing entry point. Everything the feeder needs lives
//! in an [`AudioSystem`] value; dropping it shuts the thread down.
//!
//! The backend is built on the feeder thread (cpal streams are not `Send`)
//! and reports back over a channel once it is open and playing, so device
//! errors still surface from [`AudioSystem::start`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use thiserror::Error;

use super::backend::{self, AudioBackend, BackendError, StreamFormat};
use super::buffer::{BufferError, RingBuffer};
use super::feeder::{AudioCallback, Feeder};
use super::signal::SpaceSignal;
use crate::settings::AudioSettings;

/// Errors that can occur while starting the audio system
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Ring buffer: {0}")]
    Buffer(#[from] BufferError),

    #[error("Audio backend: {0}")]
    Backend(#[from] BackendError),

    #[error("Failed to spawn audio thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Audio thread exited before the backend was ready")]
    FeederExited,
}

/// Builds the backend on the feeder thread
pub type BackendFactory = Box<dyn FnOnce() -> Box<dyn AudioBackend> + Send>;

/// What the feeder thread hands back once playback has started
struct Ready {
    format: StreamFormat,
    backend_name: String,
    signal: Arc<SpaceSignal>,
}

/// A running audio session
pub struct AudioSystem {
    ring: Arc<RingBuffer>,
    format: StreamFormat,
    backend_name: String,
    /// Shutdown flag read by the feeder each iteration
    done: Arc<AtomicBool>,
    /// Raised on shutdown so a blocked feeder wakes up
    signal: Arc<SpaceSignal>,
    thread: Option<JoinHandle<()>>,
}

impl AudioSystem {
    /// Start audio output with the backend chosen by `settings.backend`
    pub fn start(settings: &AudioSettings, callback: AudioCallback) -> Result<Self, AudioError> {
        let backend_settings = settings.clone();
        Self::start_with(
            settings,
            Box::new(move || backend::select(&backend_settings)),
            callback,
        )
    }

    /// Start audio output on a backend built by `factory`
    ///
    /// Blocks until the backend is initialized, the first full queue is
    /// submitted, and playback has started.
    pub fn start_with(
        settings: &AudioSettings,
        factory: BackendFactory,
        callback: AudioCallback,
    ) -> Result<Self, AudioError> {
        let ring = Arc::new(RingBuffer::new(
            settings.ring_capacity_bytes,
            settings.conversion,
        )?);
        let done = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<Ready, AudioError>>();

        log::info!("Starting audio system...");

        let thread = thread::Builder::new().name("audio-feeder".to_string()).spawn({
            let ring = Arc::clone(&ring);
            let done = Arc::clone(&done);
            move || {
                let mut backend = factory();
                let format = match backend.initialize() {
                    Ok(format) => format,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };

                // A full device queue must fit in the ring without lapping it
                if let Err(e) = ring.ensure_room(format.samples(format.buffer_frames)) {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }

                let ready = Ready {
                    format,
                    backend_name: backend.name().to_string(),
                    signal: backend.space_signal(),
                };

                let mut feeder = Feeder::new(backend, format, ring, callback, done);
                if let Err(e) = feeder.prime() {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
                if ready_tx.send(Ok(ready)).is_err() {
                    return;
                }
                feeder.run();
            }
        })?;

        match ready_rx.recv() {
            Ok(Ok(ready)) => {
                log::info!(
                    "Audio system started: {} backend, {} Hz, {} channels, {} frame queue, {:?} conversion",
                    ready.backend_name,
                    ready.format.sample_rate,
                    ready.format.channels,
                    ready.format.buffer_frames,
                    ring.conversion()
                );
                Ok(Self {
                    ring,
                    format: ready.format,
                    backend_name: ready.backend_name,
                    done,
                    signal: ready.signal,
                    thread: Some(thread),
                })
            }
            Ok(Err(e)) => {
                log::error!("Failed to start audio system: {}", e);
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                log::error!("Audio thread exited during startup");
                let _ = thread.join();
                Err(AudioError::FeederExited)
            }
        }
    }

    /// The ring buffer the application writes into
    pub fn ring(&self) -> Arc<RingBuffer> {
        Arc::clone(&self.ring)
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    /// Whether the feeder thread is still alive
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|thread| !thread.is_finished())
            .unwrap_or(false)
    }

    /// Stop the feeder thread and wait for it to exit
    ///
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        self.done.store(true, Ordering::Release);
        self.signal.notify();

        if thread.join().is_err() {
            log::error!("Audio feeder thread panicked");
        }
        log::info!("Audio system shut down");
    }
}

impl Drop for AudioSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::mock::{MockBackend, MockState};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    const FORMAT: StreamFormat = StreamFormat {
        sample_rate: 48000,
        channels: 2,
        buffer_frames: 8,
    };

    fn silence() -> AudioCallback {
        Box::new(|ring: &RingBuffer, _format: StreamFormat, samples: usize| {
            ring.write(&vec![0.0; samples]);
        })
    }

    fn start_mock() -> (AudioSystem, Arc<Mutex<MockState>>, Arc<SpaceSignal>) {
        let (backend, state, signal) = MockBackend::new(FORMAT);
        let system = AudioSystem::start_with(
            &AudioSettings::default(),
            Box::new(move || Box::new(backend) as Box<dyn AudioBackend>),
            silence(),
        )
        .unwrap();
        (system, state, signal)
    }

    /// Poll `condition` for up to a second
    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_start_primes_and_plays() {
        let (system, state, _signal) = start_mock();

        assert_eq!(system.format(), FORMAT);
        assert_eq!(system.backend_name(), "mock");
        assert!(system.is_running());

        let state = state.lock().unwrap();
        assert_eq!(state.commits, vec![8]);
        assert!(state.started);
    }

    #[test]
    fn test_signal_triggers_refill() {
        let (mut system, state, signal) = start_mock();

        state.lock().unwrap().queued = 5;
        signal.notify();

        assert!(wait_until(|| state.lock().unwrap().commits.len() == 2));
        assert_eq!(state.lock().unwrap().commits, vec![8, 3]);
        system.shutdown();
    }

    #[test]
    fn test_shutdown_wakes_blocked_feeder() {
        let (mut system, state, _signal) = start_mock();

        // Queue has room, but nothing signals space
        state.lock().unwrap().queued = 0;
        thread::sleep(Duration::from_millis(20));

        system.shutdown();

        assert!(!system.is_running());
        let state = state.lock().unwrap();
        assert_eq!(state.commits, vec![8]);
        assert!(state.stopped);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (mut system, _state, _signal) = start_mock();
        system.shutdown();
        system.shutdown();
        assert!(!system.is_running());
    }

    #[test]
    fn test_initialize_failure_is_reported() {
        let (backend, state, _signal) = MockBackend::new(FORMAT);
        state.lock().unwrap().fail_initialize = true;

        let result = AudioSystem::start_with(
            &AudioSettings::default(),
            Box::new(move || Box::new(backend) as Box<dyn AudioBackend>),
            silence(),
        );

        assert!(matches!(
            result,
            Err(AudioError::Backend(BackendError::NoOutputDevice))
        ));
    }

    #[test]
    fn test_device_queue_larger_than_ring_is_rejected() {
        // 16 stereo frames = 32 samples, ring holds 16
        let format = StreamFormat {
            buffer_frames: 16,
            ..FORMAT
        };
        let (backend, state, _signal) = MockBackend::new(format);
        let settings = AudioSettings {
            ring_capacity_bytes: 64,
            ..AudioSettings::default()
        };

        let result = AudioSystem::start_with(
            &settings,
            Box::new(move || Box::new(backend) as Box<dyn AudioBackend>),
            Box::new(|ring: &RingBuffer, _format: StreamFormat, samples: usize| {
                let ramp: Vec<f32> = (0..samples).map(|i| (i as f32 + 0.5) / 32767.0).collect();
                ring.write(&ramp);
            }),
        );

        assert!(matches!(
            result,
            Err(AudioError::Buffer(BufferError::TooSmall {
                capacity: 64,
                needed: 128
            }))
        ));
        let state = state.lock().unwrap();
        assert!(state.commits.is_empty());
        assert!(!state.started);
    }

    #[test]
    fn test_device_queue_equal_to_ring_is_rejected() {
        // 8 stereo frames = 16 samples = 64 bytes, exactly the ring size
        let (backend, _state, _signal) = MockBackend::new(FORMAT);
        let settings = AudioSettings {
            ring_capacity_bytes: 64,
            ..AudioSettings::default()
        };

        let result = AudioSystem::start_with(
            &settings,
            Box::new(move || Box::new(backend) as Box<dyn AudioBackend>),
            silence(),
        );

        assert!(matches!(
            result,
            Err(AudioError::Buffer(BufferError::TooSmall { .. }))
        ));
    }

    #[test]
    fn test_full_queue_refill_keeps_sample_order() {
        let (backend, state, _signal) = MockBackend::new(FORMAT);
        let settings = AudioSettings {
            ring_capacity_bytes: 68,
            ..AudioSettings::default()
        };

        let mut system = AudioSystem::start_with(
            &settings,
            Box::new(move || Box::new(backend) as Box<dyn AudioBackend>),
            Box::new(|ring: &RingBuffer, _format: StreamFormat, samples: usize| {
                let ramp: Vec<f32> = (0..samples).map(|i| (i as f32 + 0.5) / 32767.0).collect();
                ring.write(&ramp);
            }),
        )
        .unwrap();
        system.shutdown();

        let expected: Vec<i16> = (0..16).collect();
        assert_eq!(state.lock().unwrap().committed_samples, expected);
    }

    #[test]
    fn test_bad_ring_capacity_is_reported() {
        let (backend, _state, _signal) = MockBackend::new(FORMAT);
        let settings = AudioSettings {
            ring_capacity_bytes: 6,
            ..AudioSettings::default()
        };

        let result = AudioSystem::start_with(
            &settings,
            Box::new(move || Box::new(backend) as Box<dyn AudioBackend>),
            silence(),
        );

        assert!(matches!(
            result,
            Err(AudioError::Buffer(BufferError::UnalignedCapacity(6)))
        ));
    }
}
