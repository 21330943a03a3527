//! Voice processing module
//!
//! Collaborator seams for the platform link, speech-to-text, text-to-speech
//! and voice conversion, plus the local microphone/speaker link.

mod audio;
mod capture;
mod convert;
mod link;
mod local;
mod playback;
mod stt;
mod tts;

pub use audio::{decode_mp3, f32_to_i16, frame_energy, pcm_to_wav};
pub use capture::Microphone;
pub use convert::{VoiceConversionClient, VoiceConverter, VoiceParams};
pub use link::{AudioClip, AudioFrame, LinkFactory, ParticipantId, Utterance, VoiceLink};
pub use local::{LOCAL_PARTICIPANT, LocalLinkFactory, LocalVoiceLink};
pub use playback::AudioOutput;
pub use stt::{SpeechToText, SttProvider, Transcriber};
pub use tts::{Synthesizer, TextToSpeech, TtsProvider};
