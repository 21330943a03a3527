//! Local microphone input, delivered as fixed-length voice frames

use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream};

use super::audio::f32_to_i16;
use super::link::AudioFrame;
use crate::{Error, Result};

/// Frame period handed to listeners, the same as platform voice packets
pub const FRAME_PERIOD: Duration = Duration::from_millis(20);

/// Cuts interleaved float input into mono frames of [`FRAME_PERIOD`]
#[derive(Debug)]
struct Framer {
    channels: usize,
    frame_len: usize,
    pending: Vec<f32>,
}

impl Framer {
    fn new(channels: u16, sample_rate: u32) -> Self {
        let per_second = usize::try_from(sample_rate).unwrap_or(usize::MAX);
        let frame_ms = usize::try_from(FRAME_PERIOD.as_millis()).unwrap_or(20);
        let frame_len = (per_second * frame_ms / 1000).max(1);
        Self {
            channels: usize::from(channels.max(1)),
            frame_len,
            pending: Vec::with_capacity(frame_len),
        }
    }

    /// Downmix `data` and return every frame it completes
    #[allow(clippy::cast_precision_loss)]
    fn push(&mut self, data: &[f32]) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        for sample in data.chunks(self.channels) {
            self.pending
                .push(sample.iter().sum::<f32>() / sample.len() as f32);
            if self.pending.len() == self.frame_len {
                frames.push(AudioFrame::new(f32_to_i16(&self.pending)));
                self.pending.clear();
            }
        }
        frames
    }
}

/// An open input stream on the default device
///
/// Not `Send`: cpal streams must stay on the thread that built them.
/// Dropping the microphone closes the stream.
pub struct Microphone {
    _stream: Stream,
    sample_rate: u32,
}

impl Microphone {
    /// Open the default input at `sample_rate` and hand every frame to `on_frame`
    ///
    /// Multi-channel devices are downmixed to mono.
    ///
    /// # Errors
    ///
    /// Returns error if there is no input device or none can capture float
    /// samples at `sample_rate`
    pub fn open<F>(sample_rate: u32, mut on_frame: F) -> Result<Self>
    where
        F: FnMut(AudioFrame) + Send + 'static,
    {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let rate = SampleRate(sample_rate);
        let range = device
            .supported_input_configs()
            .map_err(audio_error)?
            .filter(|c| {
                c.sample_format() == SampleFormat::F32
                    && c.min_sample_rate() <= rate
                    && c.max_sample_rate() >= rate
            })
            .min_by_key(cpal::SupportedStreamConfigRange::channels)
            .ok_or_else(|| Error::Audio(format!("no input config captures at {sample_rate} Hz")))?;
        let config = range.with_sample_rate(rate).config();

        let mut framer = Framer::new(config.channels, sample_rate);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for frame in framer.push(data) {
                        on_frame(frame);
                    }
                },
                |err| tracing::error!(error = %err, "microphone stream error"),
                None,
            )
            .map_err(audio_error)?;
        stream.play().map_err(audio_error)?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "microphone open"
        );

        Ok(Self {
            _stream: stream,
            sample_rate,
        })
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn audio_error(e: impl std::fmt::Display) -> Error {
    Error::Audio(e.to_string())
}
