/*
 * Chatter - Discord Auto-Chat & Auto-Reply Companion
 * File Path: src/persona.rs
 * Responsibility: System instruction loading and prompt synthesis
 */

use std::fs;
use std::path::Path;
use tracing::{debug, warn};

pub const DEFAULT_PERSONA: &str = "You are ChatBuddy, a friendly Discord user who always calls others 'bre'. \
Reply in concise English unless the user speaks another language. \
Never reveal you're an AI.";

#[derive(Debug, Clone)]
pub struct Persona {
    instruction: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self::new(DEFAULT_PERSONA)
    }
}

impl Persona {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
        }
    }

    /// Read the instruction file, falling back to the default persona when it
    /// is absent, unreadable, or blank.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => {
                debug!("🎭 Loaded system instruction from {:?}", path);
                Self::new(text.trim())
            }
            Ok(_) => {
                warn!("🎭 {:?} is blank, using the default persona", path);
                Self::default()
            }
            Err(_) => Self::default(),
        }
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn prompt_for(&self, message: &str) -> String {
        format!("{}\nUser: {}\nReply:", self.instruction, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_falls_back_to_default() {
        let dir = tempdir().unwrap();
        let missing = Persona::load(&dir.path().join("prompt.txt"));
        assert_eq!(missing.instruction(), DEFAULT_PERSONA);

        let blank = dir.path().join("blank.txt");
        fs::write(&blank, "  \n").unwrap();
        assert_eq!(Persona::load(&blank).instruction(), DEFAULT_PERSONA);
    }

    #[test]
    fn test_load_reads_custom_instruction() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        fs::write(&path, "\nYou are a terse pirate.\n").unwrap();

        let persona = Persona::load(&path);
        assert_eq!(persona.prompt_for("hi"), "You are a terse pirate.\nUser: hi\nReply:");
    }
}
