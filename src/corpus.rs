/*
 * Chatter - Discord Auto-Chat & Auto-Reply Companion
 * File Path: src/corpus.rs
 * Responsibility: Message corpus loading and random line selection
 */

use crate::config::ConfigError;
use rand::Rng;
use rand::seq::SliceRandom;
use std::fs;
use std::path::Path;

/// Lines available for unsolicited posting. Read once at startup.
#[derive(Debug, Clone, Default)]
pub struct MessageCorpus {
    lines: Vec<String>,
}

impl MessageCorpus {
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { lines }
    }

    /// Load the corpus. When `required`, a missing or empty file is fatal;
    /// otherwise it yields an empty corpus.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        if !path.exists() {
            if required {
                return Err(ConfigError::MissingMessages(path.to_path_buf()));
            }
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let corpus = Self::parse(&text);
        if required && corpus.is_empty() {
            return Err(ConfigError::EmptyMessages(path.to_path_buf()));
        }
        Ok(corpus)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        self.lines.choose(rng).map(String::as_str)
    }
}
