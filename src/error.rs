//! Error types for Huddle

use thiserror::Error;

/// Result type alias for Huddle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a voice session
///
/// None of these is fatal to the process: the session task converts every
/// failure into a transition back to idle, usually with a spoken apology.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// An optional integration was requested but has no credential or endpoint
    #[error("{0} is not configured")]
    ConfigurationMissing(&'static str),

    /// Speech-to-text error
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Chat completion error
    #[error("generation error: {0}")]
    Generation(String),

    /// Text-to-speech error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Voice conversion error
    #[error("voice conversion error: {0}")]
    Conversion(String),

    /// A spoken command could not be parsed
    #[error("could not parse command: {0}")]
    CommandParse(String),

    /// Cancel requested for an alarm index that is not registered
    #[error("there is no alarm number {0}")]
    AlarmNotFound(usize),

    /// Web or media search error
    #[error("search error: {0}")]
    Search(String),

    /// Local audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Voice link (platform connection) error
    #[error("voice link error: {0}")]
    Link(String),

    /// Text channel error
    #[error("channel error: {0}")]
    Channel(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
