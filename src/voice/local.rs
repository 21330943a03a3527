//! Voice link backed by the local microphone and speakers

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::capture::{FRAME_PERIOD, Microphone};
use super::link::{AudioClip, AudioFrame, LinkFactory, ParticipantId, VoiceLink};
use super::playback::AudioOutput;
use crate::{Error, Result};

/// Participant id used for the person at the local microphone
pub const LOCAL_PARTICIPANT: &str = "local";

/// A one-person voice channel on this machine
pub struct LocalVoiceLink {
    sample_rate: u32,
    stop_playback: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl LocalVoiceLink {
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            stop_playback: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl VoiceLink for LocalVoiceLink {
    fn name(&self) -> &str {
        "local"
    }

    fn participants(&self) -> Vec<ParticipantId> {
        vec![ParticipantId::from(LOCAL_PARTICIPANT)]
    }

    async fn subscribe(&self, participant: &ParticipantId) -> Result<mpsc::Receiver<AudioFrame>> {
        if participant.as_str() != LOCAL_PARTICIPANT {
            return Err(Error::Link(format!("unknown participant {participant}")));
        }

        let (tx, rx) = mpsc::channel(256);
        let (ready_tx, ready_rx) = oneshot::channel();
        let sample_rate = self.sample_rate;
        let closed = Arc::clone(&self.closed);

        // cpal streams are not Send, so the microphone lives on its own thread
        std::thread::spawn(move || {
            let frames = tx.clone();
            let mic = Microphone::open(sample_rate, move |frame| {
                if frames.try_send(frame).is_err() {
                    tracing::trace!("listener behind, dropping microphone frame");
                }
            });
            let mic = match mic {
                Ok(mic) => {
                    let _ = ready_tx.send(Ok(()));
                    mic
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            while !closed.load(Ordering::SeqCst) && !tx.is_closed() {
                std::thread::sleep(FRAME_PERIOD);
            }

            drop(mic);
            tracing::debug!("microphone closed");
        });

        ready_rx
            .await
            .map_err(|_| Error::Audio("microphone thread exited".to_string()))??;

        Ok(rx)
    }

    async fn play(&self, clip: AudioClip, volume: f32) -> Result<()> {
        let output = AudioOutput::new(Arc::clone(&self.stop_playback));
        tracing::debug!(clip = %clip.label, "playing on local speakers");

        tokio::task::spawn_blocking(move || output.play_mp3_blocking(&clip.data, volume))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }

    fn stop_playback(&self) {
        self.stop_playback.store(true, Ordering::SeqCst);
    }

    async fn play_media(&self, locator: &str) -> Result<()> {
        Err(Error::Link(format!("local link cannot stream {locator}")))
    }

    async fn post_text(&self, text: &str) -> Result<()> {
        tracing::info!(target: "huddle::transcript", "{text}");
        Ok(())
    }

    async fn disconnect(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.stop_playback();
    }
}

/// Builds [`LocalVoiceLink`]s regardless of the requested channel
pub struct LocalLinkFactory {
    sample_rate: u32,
}

impl LocalLinkFactory {
    #[must_use]
    pub const fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

#[async_trait]
impl LinkFactory for LocalLinkFactory {
    async fn connect(&self, channel: &str) -> Result<Arc<dyn VoiceLink>> {
        tracing::info!(channel, "opening local voice link");
        Ok(Arc::new(LocalVoiceLink::new(self.sample_rate)))
    }
}
