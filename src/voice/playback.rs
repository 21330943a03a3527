//! Audio playback to the local speakers

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::audio::decode_mp3;
use crate::{Error, Result};

/// Fallback rate when a clip does not report one (matches common TTS output)
const DEFAULT_PLAYBACK_RATE: u32 = 24_000;

/// Plays decoded audio on the default output device
///
/// Every call opens the device afresh, so a value can be built on any
/// thread; playback itself blocks and belongs on `spawn_blocking`.
pub struct AudioOutput {
    stop: Arc<AtomicBool>,
}

impl AudioOutput {
    /// Create an output whose playback can be interrupted through `stop`
    #[must_use]
    pub const fn new(stop: Arc<AtomicBool>) -> Self {
        Self { stop }
    }

    /// Decode and play MP3 bytes, blocking until finished or stopped
    ///
    /// # Errors
    ///
    /// Returns error if decoding fails or no output device is usable
    pub fn play_mp3_blocking(&self, mp3_data: &[u8], volume: f32) -> Result<()> {
        let (samples, rate) = decode_mp3(mp3_data)?;
        let rate = if rate == 0 { DEFAULT_PLAYBACK_RATE } else { rate };
        self.play_samples_blocking(samples, rate, volume)
    }

    /// Play mono f32 samples, blocking until finished or stopped
    ///
    /// # Errors
    ///
    /// Returns error if no output device is usable
    pub fn play_samples_blocking(&self, samples: Vec<f32>, rate: u32, volume: f32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        self.stop.store(false, Ordering::SeqCst);

        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;
        let config = output_config(&device, rate)?;
        let channels = usize::from(config.channels);

        let total = samples.len();
        let samples: Arc<Vec<f32>> = Arc::new(samples.into_iter().map(|s| s * volume).collect());
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for frame in data.chunks_mut(channels) {
                            let pos = position.load(Ordering::Relaxed);
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Relaxed);
                                0.0
                            });
                            frame.fill(sample);
                            if pos < samples.len() {
                                position.store(pos + 1, Ordering::Relaxed);
                            }
                        }
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (total as u64 * 1000) / u64::from(rate);
        let deadline = Instant::now() + Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Relaxed) {
            if self.stop.load(Ordering::SeqCst) {
                tracing::debug!("playback interrupted");
                break;
            }
            if Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        drop(stream);
        tracing::debug!(samples = total, rate, "playback complete");

        Ok(())
    }
}

/// Find a mono (or stereo fallback) output config at `rate`
fn output_config(device: &cpal::Device, rate: u32) -> Result<StreamConfig> {
    let rate = SampleRate(rate);
    let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
        c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
    };

    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| supports(c, 1))
        .or_else(|| device.supported_output_configs().ok()?.find(|c| supports(c, 2)))
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    Ok(supported.with_sample_rate(rate).config())
}
