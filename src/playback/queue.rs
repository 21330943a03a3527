//! Ordered assembly of out-of-order synthesis results
//!
//! A [`PlaybackQueue`] tracks one response. Chunks are synthesized
//! concurrently and may land in any order; the queue hands them out strictly
//! by index, one at a time. When the chunk at the cursor is late, each
//! backoff tick spends one unit of the retry budget; an exhausted budget
//! abandons the rest of the response.

use std::time::Duration;

/// Backoff policy while waiting for the next chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait between ticks
    pub backoff: Duration,
    /// Ticks allowed per chunk before the response is abandoned
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(1000),
            max_retries: 10,
        }
    }
}

#[derive(Debug)]
enum Slot<T> {
    Pending,
    Ready(T),
    Failed,
    Played,
}

/// What the owner should do next
#[derive(Debug, PartialEq, Eq)]
pub enum Step<T> {
    /// Start playing this chunk; report back with [`PlaybackQueue::played`]
    Play { index: usize, clip: T },
    /// Nothing playable yet
    Wait,
    /// A chunk is already playing
    Playing,
    /// Every chunk has played
    Finished,
}

/// Outcome of a backoff tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// No waiting is needed right now
    Idle,
    /// Still waiting on the chunk at the cursor
    Retry { index: usize, attempt: u32 },
    /// The chunk at the cursor failed; synthesize it again
    Resynthesize { index: usize, attempt: u32 },
    /// Budget exhausted; pending chunks have been discarded
    Abandon { index: usize },
}

/// Chunks of one response, consumed in index order
#[derive(Debug)]
pub struct PlaybackQueue<T> {
    response: u64,
    slots: Vec<Slot<T>>,
    cursor: usize,
    playing: bool,
    retries: u32,
    policy: RetryPolicy,
}

impl<T> PlaybackQueue<T> {
    /// Queue for `chunks` pending chunks of response `response`
    #[must_use]
    pub fn new(response: u64, chunks: usize, policy: RetryPolicy) -> Self {
        Self {
            response,
            slots: (0..chunks).map(|_| Slot::Pending).collect(),
            cursor: 0,
            playing: false,
            retries: 0,
            policy,
        }
    }

    #[must_use]
    pub const fn response(&self) -> u64 {
        self.response
    }

    /// Index of the next chunk to play
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Store a synthesized chunk; ignored for played or unknown indices
    pub fn ready(&mut self, index: usize, clip: T) {
        let response = self.response;
        match self.slots.get_mut(index) {
            Some(slot @ (Slot::Pending | Slot::Failed)) => *slot = Slot::Ready(clip),
            _ => tracing::debug!(response, index, "dropping late chunk"),
        }
    }

    /// Record a synthesis failure
    pub fn failed(&mut self, index: usize) {
        if let Some(slot @ Slot::Pending) = self.slots.get_mut(index) {
            *slot = Slot::Failed;
        }
    }

    /// Hand out the chunk at the cursor if it is ready
    pub fn advance(&mut self) -> Step<T> {
        if self.playing {
            return Step::Playing;
        }
        let index = self.cursor;
        let Some(slot) = self.slots.get_mut(index) else {
            return Step::Finished;
        };
        if !matches!(slot, Slot::Ready(_)) {
            return Step::Wait;
        }
        let Slot::Ready(clip) = std::mem::replace(slot, Slot::Played) else {
            return Step::Wait;
        };
        self.playing = true;
        self.retries = 0;
        Step::Play { index, clip }
    }

    /// The chunk handed out by [`advance`](Self::advance) finished playing
    pub fn played(&mut self, index: usize) {
        if self.playing && index == self.cursor {
            self.playing = false;
            self.cursor += 1;
        }
    }

    /// Spend one unit of the retry budget if the cursor chunk is still missing
    pub fn tick(&mut self) -> Tick {
        if self.playing {
            return Tick::Idle;
        }
        let index = self.cursor;
        let failed = match self.slots.get(index) {
            Some(Slot::Pending) => false,
            Some(Slot::Failed) => true,
            _ => return Tick::Idle,
        };

        if self.retries >= self.policy.max_retries {
            self.abandon();
            return Tick::Abandon { index };
        }

        self.retries += 1;
        let attempt = self.retries;
        if failed {
            self.slots[index] = Slot::Pending;
            Tick::Resynthesize { index, attempt }
        } else {
            Tick::Retry { index, attempt }
        }
    }

    /// Drop every chunk that has not played
    pub fn abandon(&mut self) {
        for slot in &mut self.slots[self.cursor..] {
            *slot = Slot::Played;
        }
        self.cursor = self.slots.len();
        self.playing = false;
    }

    /// Whether the whole response has been consumed
    #[must_use]
    pub fn is_finished(&self) -> bool {
        !self.playing && self.cursor >= self.slots.len()
    }
}
