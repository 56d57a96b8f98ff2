//! audio-feeder demo - plays a sine tone through the feeder
//!
//! Usage: `audio-feeder [seconds]` (default 3). Device and tone settings
//! come from `~/.config/audio-feeder/settings.json`, which is created with
//! defaults on first run.

use std::f32::consts::TAU;
use std::time::Duration;

use audio_feeder::audio::{AudioError, AudioSystem, RingBuffer, StreamFormat};
use audio_feeder::settings::AudioSettings;

/// Playback length when no argument is given
const DEFAULT_SECONDS: f32 = 3.0;

/// Sine oscillator writing the same value to every channel
struct Tone {
    frequency: f32,
    volume: f32,
    /// Position within the current cycle (0.0 to 1.0)
    phase: f32,
    /// Reused output block
    scratch: Vec<f32>,
}

impl Tone {
    fn new(frequency: f32, volume: f32) -> Self {
        Self {
            frequency,
            volume,
            phase: 0.0,
            scratch: Vec::new(),
        }
    }

    fn fill(&mut self, ring: &RingBuffer, format: StreamFormat, samples: usize) {
        let channels = format.channels.max(1) as usize;
        let step = self.frequency / format.sample_rate as f32;

        self.scratch.clear();
        for _ in 0..samples / channels {
            let value = (self.phase * TAU).sin() * self.volume;
            self.scratch.extend(std::iter::repeat(value).take(channels));
            self.phase = (self.phase + step).fract();
        }
        ring.write(&self.scratch);
    }
}

fn main() -> Result<(), AudioError> {
    env_logger::init();
    log::info!("Starting audio-feeder");

    let settings = AudioSettings::load_or_create();
    let seconds = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse::<f32>().ok())
        .unwrap_or(DEFAULT_SECONDS)
        .max(0.0);

    let mut tone = Tone::new(settings.tone_frequency, settings.tone_volume);
    let mut system = AudioSystem::start(
        &settings,
        Box::new(move |ring: &RingBuffer, format: StreamFormat, samples: usize| {
            tone.fill(ring, format, samples)
        }),
    )?;

    log::info!(
        "Playing {} Hz on the {} backend for {:.1}s",
        settings.tone_frequency,
        system.backend_name(),
        seconds
    );
    std::thread::sleep(Duration::from_secs_f32(seconds));

    system.shutdown();
    Ok(())
}
