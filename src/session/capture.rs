//! Per-participant utterance capture
//!
//! A listener task per participant reads audio frames and cuts them into
//! utterances at silence. As soon as one utterance is handed off, the next
//! [`CaptureSession`] starts on the same stream, so the session keeps
//! hearing "stop" while it is busy or speaking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::Result;
use crate::voice::{AudioFrame, ParticipantId, Utterance, VoiceLink, frame_energy};

/// When an utterance starts and ends
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapturePolicy {
    /// Silence after speech that ends an utterance
    pub silence: Duration,
    /// Normalized RMS above which a frame counts as speech
    pub energy_threshold: f32,
    pub sample_rate: u32,
    /// Hard cap on one utterance
    pub max_utterance: Duration,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            silence: Duration::from_millis(2000),
            energy_threshold: 0.01,
            sample_rate: 48_000,
            max_utterance: Duration::from_secs(30),
        }
    }
}

fn samples_duration(samples: usize, sample_rate: u32) -> Duration {
    let micros = u64::try_from(samples)
        .unwrap_or(u64::MAX)
        .saturating_mul(1_000_000)
        / u64::from(sample_rate.max(1));
    Duration::from_micros(micros)
}

/// One utterance being accumulated
#[derive(Debug)]
pub struct CaptureSession {
    participant: ParticipantId,
    started_at: Option<DateTime<Utc>>,
    samples: Vec<i16>,
    trailing_silence: Duration,
    policy: CapturePolicy,
}

impl CaptureSession {
    #[must_use]
    pub const fn new(participant: ParticipantId, policy: CapturePolicy) -> Self {
        Self {
            participant,
            started_at: None,
            samples: Vec::new(),
            trailing_silence: Duration::ZERO,
            policy,
        }
    }

    /// Whether speech has been heard yet
    #[must_use]
    pub const fn has_speech(&self) -> bool {
        self.started_at.is_some()
    }

    /// Append a frame; returns `true` once the utterance is complete
    ///
    /// Silence before the first speech frame is dropped.
    pub fn push(&mut self, frame: &AudioFrame) -> bool {
        let voiced = frame_energy(&frame.samples) >= self.policy.energy_threshold;

        if !self.has_speech() {
            if !voiced {
                return false;
            }
            self.started_at = Some(Utc::now());
        }

        self.samples.extend_from_slice(&frame.samples);
        if voiced {
            self.trailing_silence = Duration::ZERO;
        } else {
            self.trailing_silence += samples_duration(frame.samples.len(), self.policy.sample_rate);
        }

        self.trailing_silence >= self.policy.silence
            || samples_duration(self.samples.len(), self.policy.sample_rate) >= self.policy.max_utterance
    }

    /// Close the session; `None` when no speech was captured
    #[must_use]
    pub fn finish(self) -> Option<Utterance> {
        let started_at = self.started_at?;
        Some(Utterance {
            participant: self.participant,
            started_at,
            sample_rate: self.policy.sample_rate,
            samples: self.samples,
        })
    }
}

/// Receives completed utterances
pub type UtteranceSink = Arc<dyn Fn(Utterance) + Send + Sync>;

/// Read frames until the stream closes, emitting one utterance per silence
///
/// A stream that goes quiet (no frames at all) for the silence window also
/// ends the current utterance.
pub async fn listen(
    participant: ParticipantId,
    mut frames: mpsc::Receiver<AudioFrame>,
    policy: CapturePolicy,
    sink: UtteranceSink,
) {
    loop {
        let mut capture = CaptureSession::new(participant.clone(), policy);
        let open = loop {
            match tokio::time::timeout(policy.silence, frames.recv()).await {
                Ok(Some(frame)) => {
                    if capture.push(&frame) {
                        break true;
                    }
                }
                Ok(None) => break false,
                Err(_) if capture.has_speech() => break true,
                Err(_) => {}
            }
        };

        if let Some(utterance) = capture.finish() {
            tracing::debug!(
                participant = %participant,
                secs = utterance.duration().as_secs_f32(),
                "utterance captured"
            );
            sink(utterance);
        }

        if !open {
            tracing::debug!(participant = %participant, "audio stream closed");
            return;
        }
    }
}

/// Owns one listener task per participant
pub struct CaptureManager {
    link: Arc<dyn VoiceLink>,
    policy: CapturePolicy,
    sink: UtteranceSink,
    listeners: HashMap<ParticipantId, JoinHandle<()>>,
}

impl std::fmt::Debug for CaptureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureManager")
            .field("link", &self.link.name())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl CaptureManager {
    #[must_use]
    pub fn new(link: Arc<dyn VoiceLink>, policy: CapturePolicy, sink: UtteranceSink) -> Self {
        Self {
            link,
            policy,
            sink,
            listeners: HashMap::new(),
        }
    }

    /// Start listening to `participant` unless a listener is already running
    ///
    /// # Errors
    ///
    /// Returns error if the link cannot subscribe to the participant's audio
    pub async fn ensure_listening(&mut self, participant: &ParticipantId) -> Result<()> {
        if self
            .listeners
            .get(participant)
            .is_some_and(|handle| !handle.is_finished())
        {
            return Ok(());
        }

        let frames = self.link.subscribe(participant).await?;
        let handle = tokio::spawn(listen(
            participant.clone(),
            frames,
            self.policy,
            Arc::clone(&self.sink),
        ));
        self.listeners.insert(participant.clone(), handle);
        tracing::debug!(participant = %participant, "listening");
        Ok(())
    }

    /// Stop every listener
    pub fn shutdown(&mut self) {
        for (_, handle) in self.listeners.drain() {
            handle.abort();
        }
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CapturePolicy {
        CapturePolicy {
            silence: Duration::from_millis(100),
            energy_threshold: 0.01,
            sample_rate: 1000,
            max_utterance: Duration::from_secs(5),
        }
    }

    fn loud(n: usize) -> AudioFrame {
        AudioFrame::new(vec![8000; n])
    }

    fn quiet(n: usize) -> AudioFrame {
        AudioFrame::new(vec![0; n])
    }

    #[test]
    fn leading_silence_is_dropped() {
        let mut capture = CaptureSession::new("p".into(), policy());
        assert!(!capture.push(&quiet(500)));
        assert!(!capture.has_speech());
        assert!(capture.finish().is_none());
    }

    #[test]
    fn trailing_silence_ends_utterance() {
        let mut capture = CaptureSession::new("p".into(), policy());
        assert!(!capture.push(&loud(50)));
        assert!(!capture.push(&quiet(50)));
        assert!(capture.push(&quiet(50)));

        let utterance = capture.finish().unwrap();
        assert_eq!(utterance.samples.len(), 150);
        assert_eq!(utterance.participant.as_str(), "p");
    }

    #[test]
    fn speech_resets_silence() {
        let mut capture = CaptureSession::new("p".into(), policy());
        capture.push(&loud(10));
        capture.push(&quiet(90));
        assert!(!capture.push(&loud(10)));
        assert!(!capture.push(&quiet(90)));
    }

    #[test]
    fn long_speech_is_capped() {
        let mut capture = CaptureSession::new("p".into(), policy());
        assert!(capture.push(&loud(5000)));
    }

    #[tokio::test]
    async fn listener_restarts_after_each_utterance() {
        let (tx, rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let sink: UtteranceSink = Arc::new(move |u: Utterance| {
            let _ = out_tx.send(u);
        });
        let task = tokio::spawn(listen("p".into(), rx, policy(), sink));

        for _ in 0..2 {
            tx.send(loud(20)).await.unwrap();
            tx.send(quiet(100)).await.unwrap();
        }
        drop(tx);

        assert_eq!(out_rx.recv().await.unwrap().samples.len(), 120);
        assert_eq!(out_rx.recv().await.unwrap().samples.len(), 120);
        task.await.unwrap();
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn quiet_stream_times_out_utterance() {
        let (tx, rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let sink: UtteranceSink = Arc::new(move |u: Utterance| {
            let _ = out_tx.send(u);
        });
        tokio::spawn(listen("p".into(), rx, policy(), sink));

        tx.send(loud(20)).await.unwrap();
        let utterance = tokio::time::timeout(Duration::from_secs(5), out_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(utterance.samples.len(), 20);
        drop(tx);
    }
}
