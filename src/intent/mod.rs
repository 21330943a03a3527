//! Transcript classification
//!
//! [`IntentRouter::classify`] turns one transcript into an [`Intent`]:
//! stop phrases first (when something is interruptible), then the trigger
//! check, then command phrase-sets in priority order, then the assistant.

mod phrases;

use std::collections::HashMap;
use std::fmt;

pub use phrases::{
    CommandKind, CommandRule, PhraseBook, PhraseSet, Word, argument_text, join_words,
    normalize_token, split_words, token_count,
};

use crate::alarm::{AlarmKind, parse_index};

/// Classification of one transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Nothing actionable (empty, or a single word after the trigger)
    Noise,
    /// Not addressed to the assistant
    Unaddressed,
    ResetHistory,
    LeaveSession,
    StopPlayback,
    PlayMedia(String),
    ScheduleTimer { query: String, kind: AlarmKind },
    CancelTimer(Option<usize>),
    ListTimers,
    SearchQuery(String),
    AssistantQuery(String),
}

impl Intent {
    /// True for every variant produced by a command phrase-set
    #[must_use]
    pub const fn is_command(&self) -> bool {
        !matches!(
            self,
            Self::Noise | Self::Unaddressed | Self::AssistantQuery(_)
        )
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Noise => write!(f, "noise"),
            Self::Unaddressed => write!(f, "unaddressed"),
            Self::ResetHistory => write!(f, "reset-history"),
            Self::LeaveSession => write!(f, "leave-session"),
            Self::StopPlayback => write!(f, "stop-playback"),
            Self::PlayMedia(q) => write!(f, "play-media({q})"),
            Self::ScheduleTimer { query, kind } => write!(f, "schedule-{kind}({query})"),
            Self::CancelTimer(Some(i)) => write!(f, "cancel-timer({i})"),
            Self::CancelTimer(None) => write!(f, "cancel-timer"),
            Self::ListTimers => write!(f, "list-timers"),
            Self::SearchQuery(q) => write!(f, "search({q})"),
            Self::AssistantQuery(q) => write!(f, "assistant({q})"),
        }
    }
}

/// Session facts the router needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteContext {
    /// Busy, speaking, alarm ringing or media playing
    pub interruptible: bool,
    /// Every utterance counts as addressed
    pub trigger_free: bool,
}

/// Trigger phrases plus command phrase-sets
#[derive(Debug, Clone)]
pub struct IntentRouter {
    triggers: Vec<Vec<String>>,
    book: PhraseBook,
}

impl Default for IntentRouter {
    fn default() -> Self {
        Self::new(&["bot".to_string()], PhraseBook::default())
    }
}

impl IntentRouter {
    #[must_use]
    pub fn new(triggers: &[String], book: PhraseBook) -> Self {
        let triggers = triggers
            .iter()
            .map(|t| {
                t.split_whitespace()
                    .map(normalize_token)
                    .filter(|w| !w.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|t| !t.is_empty())
            .collect();
        Self { triggers, book }
    }

    /// Router with default phrase-sets, overridden per command key
    #[must_use]
    pub fn with_overrides(triggers: &[String], overrides: &HashMap<String, Vec<String>>) -> Self {
        Self::new(triggers, PhraseBook::with_overrides(overrides))
    }

    /// Word range of the first trigger phrase, matched as consecutive words
    fn find_trigger(&self, words: &[Word]) -> Option<(usize, usize)> {
        let norms: Vec<&str> = words.iter().map(|w| w.norm.as_str()).collect();
        (0..norms.len()).find_map(|start| {
            self.triggers.iter().find_map(|trigger| {
                let end = start + trigger.len();
                (end <= norms.len() && norms[start..end] == trigger[..]).then_some((start, end))
            })
        })
    }

    /// Classify one transcript
    #[must_use]
    pub fn classify(&self, text: &str, ctx: RouteContext) -> Intent {
        let mut words = split_words(text);
        if token_count(&words) == 0 {
            return Intent::Noise;
        }

        if ctx.interruptible
            && self
                .book
                .rule(CommandKind::StopPlayback)
                .is_some_and(|rule| rule.matching(&words).is_some())
        {
            return Intent::StopPlayback;
        }

        match self.find_trigger(&words) {
            Some((start, end)) => {
                words.drain(start..end);
            }
            None if !ctx.trigger_free => return Intent::Unaddressed,
            None => {}
        }

        if token_count(&words) <= 1 {
            return Intent::Noise;
        }

        let Some((kind, phrase)) = self.book.first_match(&words) else {
            return Intent::AssistantQuery(join_words(&words));
        };
        let residual = argument_text(&phrase.residual(&words));

        match kind {
            CommandKind::ResetHistory => Intent::ResetHistory,
            CommandKind::LeaveSession => Intent::LeaveSession,
            CommandKind::StopPlayback => Intent::StopPlayback,
            CommandKind::PlayMedia => Intent::PlayMedia(residual),
            CommandKind::Schedule(kind) => Intent::ScheduleTimer {
                query: residual,
                kind,
            },
            CommandKind::CancelTimer => Intent::CancelTimer(parse_index(&residual)),
            CommandKind::ListTimers => Intent::ListTimers,
            CommandKind::Search => Intent::SearchQuery(residual),
        }
    }
}
