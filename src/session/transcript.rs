//! Plain-text conversation log for transcribing sessions

use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::io::AsyncWriteExt;

use crate::Result;

/// Append-only transcript, mirrored to a file
#[derive(Debug)]
pub struct TranscriptLog {
    path: PathBuf,
    lines: Vec<String>,
}

impl TranscriptLog {
    /// Create `<dir>/<channel>-<timestamp>.txt`
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be created
    pub async fn create(dir: &Path, channel: &str) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let safe: String = channel
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let path = dir.join(format!("{safe}-{}.txt", Local::now().format("%Y%m%d-%H%M%S")));
        tokio::fs::File::create(&path).await?;

        tracing::info!(path = %path.display(), "transcript started");
        Ok(Self {
            path,
            lines: Vec::new(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one line of the conversation
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub async fn append(&mut self, speaker: &str, text: &str) -> Result<()> {
        let line = format!("[{}] {speaker}: {text}", Local::now().format("%H:%M:%S"));

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;

        self.lines.push(line);
        Ok(())
    }

    /// The whole conversation so far
    #[must_use]
    pub fn render(&self) -> String {
        self.lines.join("\n")
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
