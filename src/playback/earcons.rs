//! Short notification sounds

use std::collections::HashMap;
use std::path::Path;

use crate::voice::AudioClip;

/// Which notification to play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Earcon {
    /// A command phrase-set matched
    Command,
    /// An assistant query was accepted
    Understood,
    /// A response is about to be spoken
    Result,
    /// An alarm is going off
    Alarm,
}

impl Earcon {
    const ALL: [Self; 4] = [Self::Command, Self::Understood, Self::Result, Self::Alarm];

    const fn default_name(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Understood => "understood",
            Self::Result => "result",
            Self::Alarm => "alarm",
        }
    }
}

/// Loaded earcon clips; missing files are simply absent
#[derive(Debug, Clone, Default)]
pub struct Earcons {
    clips: HashMap<Earcon, AudioClip>,
}

impl Earcons {
    /// Read `<dir>/<name>.mp3` for each earcon
    ///
    /// `alarm_sound` replaces the alarm file name.
    #[must_use]
    pub fn load(dir: &Path, alarm_sound: &str) -> Self {
        let mut clips = HashMap::new();

        for earcon in Earcon::ALL {
            let name = match earcon {
                Earcon::Alarm => alarm_sound,
                other => other.default_name(),
            };
            let path = if Path::new(name).extension().is_some() {
                dir.join(name)
            } else {
                dir.join(format!("{name}.mp3"))
            };

            match std::fs::read(&path) {
                Ok(data) => {
                    clips.insert(earcon, AudioClip::new(format!("earcon {name}"), data));
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "earcon not loaded");
                }
            }
        }

        tracing::debug!(loaded = clips.len(), "earcons loaded");
        Self { clips }
    }

    pub fn insert(&mut self, earcon: Earcon, clip: AudioClip) {
        self.clips.insert(earcon, clip);
    }

    #[must_use]
    pub fn get(&self, earcon: Earcon) -> Option<AudioClip> {
        self.clips.get(&earcon).cloned()
    }
}
