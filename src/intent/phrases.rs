//! Command phrase-sets
//!
//! A phrase-set is a group of tokens that must ALL appear in a transcript,
//! in any order. Commands are described as data: each command kind owns a
//! list of phrase-sets, and kinds are tested in a fixed priority order.

use std::collections::HashMap;

use crate::alarm::AlarmKind;

/// One whitespace-delimited word of a transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    /// As transcribed, punctuation and casing intact
    pub raw: String,
    /// Lowercase with punctuation removed; may be empty
    pub norm: String,
}

impl Word {
    fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            norm: normalize_token(raw),
        }
    }
}

/// Lowercase a token and drop everything that is not a letter or digit
#[must_use]
pub fn normalize_token(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split a transcript into words
#[must_use]
pub fn split_words(text: &str) -> Vec<Word> {
    text.split_whitespace().map(Word::new).collect()
}

/// Number of words that carry at least one letter or digit
#[must_use]
pub fn token_count(words: &[Word]) -> usize {
    words.iter().filter(|w| !w.norm.is_empty()).count()
}

/// Join words back into text
#[must_use]
pub fn join_words(words: &[Word]) -> String {
    words
        .iter()
        .map(|w| w.raw.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Join words for use as a command argument, trimming edge punctuation
#[must_use]
pub fn argument_text(words: &[Word]) -> String {
    join_words(words)
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string()
}

/// Whether a transcript word satisfies a phrase token (simple plurals fold)
fn token_matches(token: &str, word: &str) -> bool {
    word == token
        || word
            .strip_prefix(token)
            .is_some_and(|rest| rest == "s" || rest == "es")
}

/// A group of tokens that must all be present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseSet {
    tokens: Vec<String>,
}

impl PhraseSet {
    /// Parse a phrase like `"reset chat history"`
    #[must_use]
    pub fn parse(phrase: &str) -> Self {
        Self {
            tokens: phrase
                .split_whitespace()
                .map(normalize_token)
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// True when every token appears among `words`
    #[must_use]
    pub fn matches(&self, words: &[Word]) -> bool {
        !self.tokens.is_empty()
            && self
                .tokens
                .iter()
                .all(|t| words.iter().any(|w| token_matches(t, &w.norm)))
    }

    /// The words left after removing one occurrence of each token
    #[must_use]
    pub fn residual(&self, words: &[Word]) -> Vec<Word> {
        let mut remaining = words.to_vec();
        for token in &self.tokens {
            if let Some(pos) = remaining.iter().position(|w| token_matches(token, &w.norm)) {
                remaining.remove(pos);
            }
        }
        remaining
    }
}

/// Commands the router can recognize, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    ResetHistory,
    LeaveSession,
    StopPlayback,
    PlayMedia,
    Schedule(AlarmKind),
    CancelTimer,
    ListTimers,
    Search,
}

impl CommandKind {
    /// Tie-break order: first match wins
    pub const PRIORITY: [Self; 9] = [
        Self::ResetHistory,
        Self::LeaveSession,
        Self::StopPlayback,
        Self::PlayMedia,
        Self::Schedule(AlarmKind::Timer),
        Self::Schedule(AlarmKind::Alarm),
        Self::CancelTimer,
        Self::ListTimers,
        Self::Search,
    ];

    /// Key used for overrides in the `[intents]` config table
    #[must_use]
    pub const fn config_key(self) -> &'static str {
        match self {
            Self::ResetHistory => "reset",
            Self::LeaveSession => "leave",
            Self::StopPlayback => "stop",
            Self::PlayMedia => "media",
            Self::Schedule(AlarmKind::Timer) => "timer",
            Self::Schedule(AlarmKind::Alarm) => "alarm",
            Self::CancelTimer => "cancel",
            Self::ListTimers => "list",
            Self::Search => "search",
        }
    }

    const fn default_phrases(self) -> &'static [&'static str] {
        match self {
            Self::ResetHistory => &["reset chat history", "clear chat history", "forget everything"],
            Self::LeaveSession => &["leave voice chat", "leave call", "leave channel"],
            Self::StopPlayback => &["stop", "shut up", "be quiet", "never mind"],
            Self::PlayMedia => &["play"],
            Self::Schedule(AlarmKind::Timer) => &["set timer", "start timer"],
            Self::Schedule(AlarmKind::Alarm) => &["set alarm", "wake me"],
            Self::CancelTimer => &[
                "cancel timer",
                "cancel alarm",
                "delete timer",
                "delete alarm",
                "remove timer",
                "remove alarm",
            ],
            Self::ListTimers => &[
                "list timer",
                "list alarm",
                "what timer",
                "what alarm",
                "which timer",
                "which alarm",
                "any timer",
                "any alarm",
            ],
            Self::Search => &["search for", "look up", "search", "google"],
        }
    }
}

/// One command kind and the phrase-sets that trigger it
#[derive(Debug, Clone)]
pub struct CommandRule {
    pub kind: CommandKind,
    pub phrases: Vec<PhraseSet>,
}

impl CommandRule {
    /// First phrase-set of this rule that matches
    #[must_use]
    pub fn matching(&self, words: &[Word]) -> Option<&PhraseSet> {
        self.phrases.iter().find(|p| p.matches(words))
    }
}

/// All command rules, kept in priority order
#[derive(Debug, Clone)]
pub struct PhraseBook {
    rules: Vec<CommandRule>,
}

impl Default for PhraseBook {
    fn default() -> Self {
        Self::with_overrides(&HashMap::new())
    }
}

impl PhraseBook {
    /// Defaults, with any kind named in `overrides` replaced wholesale
    #[must_use]
    pub fn with_overrides(overrides: &HashMap<String, Vec<String>>) -> Self {
        let rules = CommandKind::PRIORITY
            .iter()
            .map(|&kind| {
                let phrases = overrides.get(kind.config_key()).map_or_else(
                    || kind.default_phrases().iter().map(|p| PhraseSet::parse(p)).collect(),
                    |custom| custom.iter().map(|p| PhraseSet::parse(p)).collect(),
                );
                CommandRule { kind, phrases }
            })
            .collect();

        for key in overrides.keys() {
            if !CommandKind::PRIORITY.iter().any(|k| k.config_key() == key) {
                tracing::warn!(key = %key, "unknown intent override ignored");
            }
        }

        Self { rules }
    }

    /// Highest-priority rule matching `words`, with the phrase-set that matched
    #[must_use]
    pub fn first_match(&self, words: &[Word]) -> Option<(CommandKind, &PhraseSet)> {
        self.rules
            .iter()
            .find_map(|rule| rule.matching(words).map(|p| (rule.kind, p)))
    }

    /// Rule for a specific kind
    #[must_use]
    pub fn rule(&self, kind: CommandKind) -> Option<&CommandRule> {
        self.rules.iter().find(|r| r.kind == kind)
    }

    #[must_use]
    pub fn rules(&self) -> &[CommandRule] {
        &self.rules
    }
}
