//! Huddle - a voice assistant for group voice chats
//!
//! Huddle sits in a voice channel, listens to every participant, and answers
//! when addressed by a trigger word. Each joined channel is a
//! [`session::VoiceSession`]: it captures utterances per participant,
//! transcribes them, routes the transcript to a command or to the language
//! model, and speaks the answer back as a sequence of synthesized chunks.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          Text commands (Discord) │ Local mic          │
//! └────────────────────┬─────────────────────────────────┘
//!                      │
//! ┌────────────────────▼─────────────────────────────────┐
//! │                   Orchestrator                        │
//! │   one VoiceSession per channel, shared AlarmRegistry  │
//! └────────────────────┬─────────────────────────────────┘
//!                      │
//! ┌────────────────────▼─────────────────────────────────┐
//! │ Capture │ Intent router │ Playback queue │ Speaker   │
//! └────────────────────┬─────────────────────────────────┘
//!                      │
//! ┌────────────────────▼─────────────────────────────────┐
//! │    STT  │  LLM  │  TTS  │  Voice conversion │ Search  │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod alarm;
pub mod channels;
pub mod config;
pub mod daemon;
pub mod error;
pub mod intent;
pub mod orchestrator;
pub mod playback;
pub mod session;
pub mod voice;

pub use alarm::{AlarmKind, AlarmRegistry};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use intent::{Intent, IntentRouter};
pub use orchestrator::Orchestrator;
pub use session::{ConversationState, SessionMode, VoiceSession};
