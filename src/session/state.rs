//! Conversation state machine

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// How a session treats earcons, triggers and transcripts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionMode {
    #[default]
    Normal,
    /// No earcons; responses are still spoken
    Silent,
    /// Every utterance is addressed to the assistant
    TriggerFree,
    /// Keeps a transcript and posts it on leave
    Transcribe,
}

impl SessionMode {
    #[must_use]
    pub const fn plays_earcons(self) -> bool {
        !matches!(self, Self::Silent)
    }

    #[must_use]
    pub const fn is_trigger_free(self) -> bool {
        matches!(self, Self::TriggerFree)
    }

    #[must_use]
    pub const fn keeps_transcript(self) -> bool {
        matches!(self, Self::Transcribe)
    }
}

impl FromStr for SessionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "normal" => Ok(Self::Normal),
            "silent" | "quiet" => Ok(Self::Silent),
            "free" | "trigger-free" => Ok(Self::TriggerFree),
            "transcribe" | "transcript" => Ok(Self::Transcribe),
            other => Err(Error::Config(format!("unknown session mode: {other}"))),
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Silent => write!(f, "silent"),
            Self::TriggerFree => write!(f, "free"),
            Self::Transcribe => write!(f, "transcribe"),
        }
    }
}

/// Where a session is in its current turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConversationState {
    /// Accepting new utterances
    #[default]
    Idle,
    /// Working on response `response`; new utterances are discarded
    Busy { response: u64 },
    /// Response `response` is being played
    Speaking { response: u64 },
}

impl ConversationState {
    #[must_use]
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Response the session is working on, if any
    #[must_use]
    pub const fn response(self) -> Option<u64> {
        match self {
            Self::Idle => None,
            Self::Busy { response } | Self::Speaking { response } => Some(response),
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Busy { .. } => write!(f, "busy"),
            Self::Speaking { .. } => write!(f, "speaking"),
        }
    }
}

/// Guarded transitions between [`ConversationState`]s
///
/// Each turn gets a fresh response id so results from an abandoned turn can
/// be recognized and dropped.
#[derive(Debug, Default)]
pub struct TurnState {
    state: ConversationState,
    last_response: u64,
}

impl TurnState {
    #[must_use]
    pub const fn get(&self) -> ConversationState {
        self.state
    }

    /// Whether `response` is the turn in progress
    #[must_use]
    pub fn is_current(&self, response: u64) -> bool {
        self.state.response() == Some(response)
    }

    /// `Idle -> Busy`; `None` if a turn is already running
    pub fn begin(&mut self) -> Option<u64> {
        if !self.state.is_idle() {
            return None;
        }
        self.last_response += 1;
        let response = self.last_response;
        self.state = ConversationState::Busy { response };
        tracing::debug!(response, "idle -> busy");
        Some(response)
    }

    /// `Busy -> Speaking` for the current response
    pub fn speak(&mut self, response: u64) -> bool {
        if self.state == (ConversationState::Busy { response }) {
            self.state = ConversationState::Speaking { response };
            tracing::debug!(response, "busy -> speaking");
            true
        } else {
            false
        }
    }

    /// Current response completed normally
    pub fn finish(&mut self, response: u64) -> bool {
        if self.is_current(response) {
            tracing::debug!(response, from = %self.state, "turn finished -> idle");
            self.state = ConversationState::Idle;
            true
        } else {
            false
        }
    }

    /// Force `Idle` from any state, returning the abandoned response
    pub fn reset(&mut self) -> Option<u64> {
        let abandoned = self.state.response();
        if let Some(response) = abandoned {
            tracing::debug!(response, from = %self.state, "forced -> idle");
        }
        self.state = ConversationState::Idle;
        abandoned
    }
}
