//! Hardware backend - a cpal output stream behind a fixed-size queue
//!
//! cpal pulls samples from its own callback thread; the feeder pushes.
//! A lock-free ring of `buffer_frames * channels` samples sits between
//! them and plays the role of the device's playback buffer: its occupancy
//! is the padding, and every cpal callback raises the space signal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::{frames_for_duration, AudioBackend, BackendError, StreamFormat};
use crate::audio::signal::SpaceSignal;
use crate::settings::AudioSettings;

pub struct HardwareBackend {
    /// Requested format
    sample_rate: u32,
    channels: u16,
    buffer_duration_ms: u32,

    signal: Arc<SpaceSignal>,
    /// Negotiated format, set by `initialize()`
    format: Option<StreamFormat>,
    /// The output stream (kept alive to continue playback)
    stream: Option<cpal::Stream>,
    /// Feeder side of the device queue
    producer: Option<HeapProd<i16>>,
    /// Region handed out by `get_buffer()`
    staging: Vec<i16>,
    /// Samples the device wanted but the queue didn't have
    underruns: Arc<AtomicU64>,
}

impl HardwareBackend {
    pub fn new(settings: &AudioSettings) -> Self {
        Self {
            sample_rate: settings.sample_rate,
            channels: settings.channels,
            buffer_duration_ms: settings.buffer_duration_ms,
            signal: Arc::new(SpaceSignal::new()),
            format: None,
            stream: None,
            producer: None,
            staging: Vec::new(),
            underruns: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether the default host has an output device
    pub fn is_available() -> bool {
        cpal::default_host().default_output_device().is_some()
    }

    /// Total samples replaced by silence because the queue ran dry
    pub fn underrun_samples(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Find a config for 16-bit PCM at the requested rate and channel count,
    /// or fall back to the device's default mix format
    fn negotiate(
        &self,
        device: &cpal::Device,
    ) -> Result<(cpal::StreamConfig, cpal::SampleFormat), BackendError> {
        let wanted = cpal::SampleRate(self.sample_rate);
        let supported = device.supported_output_configs()?.find(|range| {
            range.sample_format() == cpal::SampleFormat::I16
                && range.channels() == self.channels
                && range.min_sample_rate() <= wanted
                && wanted <= range.max_sample_rate()
        });

        match supported {
            Some(range) => Ok((
                range.with_sample_rate(wanted).config(),
                cpal::SampleFormat::I16,
            )),
            None => {
                log::warn!("Falling back to the device's preferred mix format");
                let config = device.default_output_config()?;
                Ok((config.config(), config.sample_format()))
            }
        }
    }
}

impl AudioBackend for HardwareBackend {
    fn name(&self) -> &str {
        "hardware"
    }

    fn initialize(&mut self) -> Result<StreamFormat, BackendError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(BackendError::NoOutputDevice)?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using output device: {}", device_name);

        let (config, sample_format) = self.negotiate(&device)?;
        log::info!("Audio config: {:?}, sample format: {:?}", config, sample_format);

        let format = StreamFormat {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
            buffer_frames: frames_for_duration(config.sample_rate.0, self.buffer_duration_ms),
        };

        let queue_len = format.samples(format.buffer_frames);
        let (producer, consumer) = HeapRb::<i16>::new(queue_len).split();
        let signal = Arc::clone(&self.signal);
        let underruns = Arc::clone(&self.underruns);

        let stream = match sample_format {
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &config, consumer, signal, underruns)?
            }
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &config, consumer, signal, underruns)?
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &config, consumer, signal, underruns)?
            }
            other => return Err(BackendError::UnsupportedFormat(format!("{:?}", other))),
        };

        self.staging = vec![0; queue_len];
        self.producer = Some(producer);
        self.stream = Some(stream);
        self.format = Some(format);

        log::info!(
            "Device queue: {} frames ({} ms)",
            format.buffer_frames,
            self.buffer_duration_ms
        );
        Ok(format)
    }

    fn space_signal(&self) -> Arc<SpaceSignal> {
        Arc::clone(&self.signal)
    }

    fn queued_frames(&mut self) -> Result<u32, BackendError> {
        match (&self.producer, self.format) {
            (Some(producer), Some(format)) => {
                Ok((producer.occupied_len() / format.channels as usize) as u32)
            }
            _ => Err(BackendError::NotInitialized),
        }
    }

    fn get_buffer(&mut self, frames: u32) -> Option<&mut [i16]> {
        let format = self.format?;
        let producer = self.producer.as_ref()?;
        let needed = format.samples(frames);

        if !queue_has_room(producer, needed, self.staging.len()) {
            return None;
        }
        Some(&mut self.staging[..needed])
    }

    fn commit(&mut self, frames: u32) {
        let (Some(producer), Some(format)) = (self.producer.as_mut(), self.format) else {
            return;
        };
        let count = format.samples(frames).min(self.staging.len());
        let dropped = push_region(producer, &self.staging[..count]);
        if dropped > 0 {
            log::warn!("Device queue dropped {} samples", dropped);
        }
    }

    fn wait_for_space(&mut self) {
        self.signal.wait();
    }

    fn start(&mut self) -> Result<(), BackendError> {
        let stream = self.stream.as_ref().ok_or(BackendError::NotInitialized)?;
        stream.play()?;
        log::info!("Audio stream started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.pause() {
                log::warn!("Failed to pause stream: {}", e);
            }
        }
        log::info!(
            "Audio stream stopped ({} underrun samples)",
            self.underrun_samples()
        );
    }
}

/// Build an output stream for any device sample format
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<i16>,
    signal: Arc<SpaceSignal>,
    underruns: Arc<AtomicU64>,
) -> Result<cpal::Stream, BackendError>
where
    T: SizedSample + FromSample<i16> + 'static,
{
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            drain_queue(data, &mut consumer, &underruns);
            signal.notify();
        },
        |err| log::error!("Audio stream error: {}", err),
        None,
    )?;
    Ok(stream)
}

/// Whether `needed` samples fit both the staging area and the device queue
fn queue_has_room(producer: &HeapProd<i16>, needed: usize, staging_len: usize) -> bool {
    needed <= staging_len && producer.vacant_len() >= needed
}

/// Push a committed region into the device queue
///
/// # Returns
/// The number of samples that didn't fit
fn push_region(producer: &mut HeapProd<i16>, region: &[i16]) -> usize {
    region.len() - producer.push_slice(region)
}

/// Copy queued samples into the device buffer, padding with silence
fn drain_queue<T: Sample + FromSample<i16>>(
    data: &mut [T],
    consumer: &mut HeapCons<i16>,
    underruns: &AtomicU64,
) {
    let mut missing = 0u64;
    for sample in data.iter_mut() {
        *sample = match consumer.try_pop() {
            Some(value) => T::from_sample(value),
            None => {
                missing += 1;
                T::EQUILIBRIUM
            }
        };
    }
    if missing > 0 {
        underruns.fetch_add(missing, Ordering::Relaxed);
    }
}
