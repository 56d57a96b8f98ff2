//! audio-feeder - keeps an output device fed from a float ring buffer
//!
//! The application writes interleaved `f32` samples into a [`RingBuffer`];
//! a dedicated thread tops up the device queue whenever it drains,
//! converting samples to 16-bit PCM on the way.
//!
//! ```no_run
//! use audio_feeder::audio::{AudioSystem, RingBuffer, StreamFormat};
//! use audio_feeder::settings::AudioSettings;
//!
//! let settings = AudioSettings::default();
//! let mut system = AudioSystem::start(
//!     &settings,
//!     Box::new(|ring: &RingBuffer, _format: StreamFormat, samples: usize| {
//!         ring.write(&vec![0.0; samples]);
//!     }),
//! )?;
//! system.shutdown();
//! # Ok::<(), audio_feeder::audio::AudioError>(())
//! ```
//!
//! [`RingBuffer`]: audio::RingBuffer

pub mod audio;
pub mod settings;
