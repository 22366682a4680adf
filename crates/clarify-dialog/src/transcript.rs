//! Per-session conversation transcripts.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, warn};

use crate::error::DialogError;
use crate::types::Language;

/// Append-only transcript file of one session.
///
/// Files are named `conversation_<dd_mm_yyyy>_<n>.txt`, `n` being the first
/// free number of the day. Transcripts that end with at most `min_lines`
/// lines, header included, are deleted on close.
#[derive(Debug)]
pub struct TranscriptLog {
    path: PathBuf,
    file: File,
    lines: usize,
    min_lines: usize,
    closed: bool,
}

impl TranscriptLog {
    pub fn create(dir: &Path, language: Language, min_lines: usize) -> Result<Self, DialogError> {
        std::fs::create_dir_all(dir)?;
        let now = Local::now();
        let day = now.format("%d_%m_%Y");

        let mut n = 0usize;
        let (path, mut file) = loop {
            let path = dir.join(format!("conversation_{day}_{n}.txt"));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        };

        writeln!(file, "# Conversation {n}")?;
        writeln!(file, "{}", now.format("%d-%m-%Y %H:%M:%S"))?;
        writeln!(file, "Language: {language}")?;
        writeln!(file)?;
        debug!(path = %path.display(), "Transcript opened");

        Ok(Self {
            path,
            file,
            lines: 4,
            min_lines,
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Record a user message.
    pub fn user(&mut self, text: &str) -> Result<(), DialogError> {
        self.append("U", text)
    }

    /// Record an assistant message.
    pub fn bot(&mut self, text: &str) -> Result<(), DialogError> {
        self.append("C", text)
    }

    fn append(&mut self, who: &str, text: &str) -> Result<(), DialogError> {
        writeln!(self.file, "{who}: {text}")?;
        self.lines += 1;
        Ok(())
    }

    /// Flush and close; short transcripts are removed. Returns whether the
    /// file was kept.
    pub fn close(mut self) -> Result<bool, DialogError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<bool, DialogError> {
        if self.closed {
            return Ok(self.path.exists());
        }
        self.closed = true;
        self.file.flush()?;
        if self.lines <= self.min_lines {
            std::fs::remove_file(&self.path)?;
            debug!(path = %self.path.display(), lines = self.lines, "Short transcript removed");
            return Ok(false);
        }
        Ok(true)
    }
}

impl Drop for TranscriptLog {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!(path = %self.path.display(), error = %e, "Failed to close transcript");
        }
    }
}
