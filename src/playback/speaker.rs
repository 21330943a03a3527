//! Single audio sink per session
//!
//! Everything a session wants to hear (response chunks, earcons, alarm
//! sounds) goes through one worker task, so two clips never overlap.
//! [`Speaker::stop`] bumps an epoch: clips queued before the stop are
//! skipped and their completions are never reported.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::voice::{AudioClip, VoiceLink};

/// What a finished clip was
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// A response chunk
    Chunk { response: u64, index: usize },
    /// Short notification sound
    Earcon,
    /// One ring of a fired alarm
    Alarm,
}

/// Completion report for one clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Played {
    pub cue: Cue,
    /// False when the link reported a playback error
    pub ok: bool,
}

/// Receives completion reports from the worker
pub type PlayedHook = Arc<dyn Fn(Played) + Send + Sync>;

struct Item {
    epoch: u64,
    clip: AudioClip,
    volume: f32,
    cue: Cue,
}

/// Handle to a session's playback worker
#[derive(Clone)]
pub struct Speaker {
    tx: mpsc::UnboundedSender<Item>,
    epoch: Arc<AtomicU64>,
    link: Arc<dyn VoiceLink>,
}

impl std::fmt::Debug for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Speaker")
            .field("link", &self.link.name())
            .field("epoch", &self.epoch.load(Ordering::Relaxed))
            .finish()
    }
}

impl Speaker {
    /// Start the worker; it exits once every handle is dropped
    #[must_use]
    pub fn spawn(link: Arc<dyn VoiceLink>, on_played: PlayedHook) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Item>();
        let epoch = Arc::new(AtomicU64::new(0));

        let worker_link = Arc::clone(&link);
        let worker_epoch = Arc::clone(&epoch);
        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                if item.epoch != worker_epoch.load(Ordering::Acquire) {
                    tracing::trace!(clip = %item.clip.label, "skipping stopped clip");
                    continue;
                }

                let label = item.clip.label.clone();
                let result = worker_link.play(item.clip, item.volume).await;
                if let Err(e) = &result {
                    tracing::warn!(clip = %label, error = %e, "playback failed");
                }

                if item.epoch == worker_epoch.load(Ordering::Acquire) {
                    on_played(Played {
                        cue: item.cue,
                        ok: result.is_ok(),
                    });
                }
            }
            tracing::debug!("speaker worker stopped");
        });

        Self { tx, epoch, link }
    }

    /// Queue a clip behind whatever is already playing
    pub fn enqueue(&self, clip: AudioClip, volume: f32, cue: Cue) {
        let item = Item {
            epoch: self.epoch.load(Ordering::Acquire),
            clip,
            volume,
            cue,
        };
        if self.tx.send(item).is_err() {
            tracing::warn!("speaker worker is gone, dropping clip");
        }
    }

    /// Cut the current clip and discard everything queued
    pub fn stop(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.link.stop_playback();
    }
}
