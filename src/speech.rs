//! Speaking the composed sentence

use crate::stats::{SharedStats, StatKind, Timer};
use std::io;
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}")]
    Status { program: String, status: ExitStatus },
}

/// Blocking text-to-speech backend
pub trait Speaker {
    fn speak(&mut self, text: &str) -> Result<(), SpeechError>;
}

// ============================================================================
// External program backend
// ============================================================================

/// Runs a TTS program (`espeak`, `say`, ...) with the text as last argument
pub struct CommandSpeaker {
    program: String,
    args: Vec<String>,
}

impl CommandSpeaker {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Speaker for CommandSpeaker {
    fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .map_err(|source| SpeechError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(SpeechError::Status {
                program: self.program.clone(),
                status,
            })
        }
    }
}

// ============================================================================
// Unified speech wrapper
// ============================================================================

pub struct Speech {
    speaker: Box<dyn Speaker>,
    stats: Option<SharedStats>,
}

impl Speech {
    pub fn new(speaker: Box<dyn Speaker>) -> Self {
        Self {
            speaker,
            stats: None,
        }
    }

    pub fn with_stats(speaker: Box<dyn Speaker>, stats: SharedStats) -> Self {
        Self {
            speaker,
            stats: Some(stats),
        }
    }

    /// Speak `text`, skipping blank input. Returns whether anything was spoken.
    pub fn speak(&mut self, text: &str) -> Result<bool, SpeechError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(false);
        }
        let timer = self
            .stats
            .as_ref()
            .map(|s| Timer::new(s, StatKind::Speech, text.len()));
        self.speaker.speak(text)?;
        if let Some(t) = timer {
            t.finish();
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Speaker for Recorder {
        fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_blank_text_is_not_spoken() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let mut speech = Speech::new(Box::new(Recorder(Arc::clone(&spoken))));
        assert!(!speech.speak("   ").unwrap());
        assert!(spoken.lock().unwrap().is_empty());
    }

    #[test]
    fn test_speak_trims_and_records_stats() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let stats = crate::stats::new_shared();
        let mut speech =
            Speech::with_stats(Box::new(Recorder(Arc::clone(&spoken))), Arc::clone(&stats));

        assert!(speech.speak("HELLO WORLD ").unwrap());
        assert_eq!(*spoken.lock().unwrap(), vec!["HELLO WORLD"]);
        assert_eq!(stats.lock().unwrap().speech.count(), 1);
    }

    #[test]
    fn test_missing_program() {
        let mut speaker = CommandSpeaker::new("signify-no-such-tts-program", Vec::new());
        assert!(matches!(
            speaker.speak("hello"),
            Err(SpeechError::Spawn { .. })
        ));
    }
}
