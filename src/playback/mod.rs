//! Spoken response delivery
//!
//! Text is cut into chunks ([`segment`]), chunks are synthesized
//! concurrently, and a [`PlaybackQueue`] releases them strictly in order to
//! the session's [`Speaker`].

mod earcons;
mod queue;
mod segment;
mod speaker;

pub use earcons::{Earcon, Earcons};
pub use queue::{PlaybackQueue, RetryPolicy, Step, Tick};
pub use segment::segment;
pub use speaker::{Cue, Played, PlayedHook, Speaker};
