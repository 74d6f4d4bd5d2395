//! Command dispatch table - maps keys to logical actions
//!
//! The tick loop only ever sees `Command` values; which key produced one is
//! decided here, from built-in bindings plus `[keys]` overrides in the config.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Logical actions surfaced to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Append the current label to the sentence
    Commit,
    Space,
    Backspace,
    Clear,
    /// Speak the sentence
    Speak,
    /// Apply a suggestion (0-based index)
    SelectSuggestion(usize),
    /// Save the current canvas (collection mode)
    SaveCanvas,
    Terminate,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("unknown key '{0}'")]
    UnknownKey(String),
}

impl FromStr for Command {
    type Err = CommandParseError;

    /// Action names as used in the `[keys]` config table.
    /// Suggestions are `select:<n>`, numbered from 1.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        let command = match name.as_str() {
            "commit" => Command::Commit,
            "space" => Command::Space,
            "backspace" => Command::Backspace,
            "clear" => Command::Clear,
            "speak" => Command::Speak,
            "save" => Command::SaveCanvas,
            "quit" | "terminate" => Command::Terminate,
            other => match other.strip_prefix("select:").map(str::parse::<usize>) {
                Some(Ok(n)) if n >= 1 => Command::SelectSuggestion(n - 1),
                _ => return Err(CommandParseError::UnknownAction(s.to_string())),
            },
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Commit => write!(f, "commit"),
            Command::Space => write!(f, "space"),
            Command::Backspace => write!(f, "backspace"),
            Command::Clear => write!(f, "clear"),
            Command::Speak => write!(f, "speak"),
            Command::SelectSuggestion(i) => write!(f, "select:{}", i + 1),
            Command::SaveCanvas => write!(f, "save"),
            Command::Terminate => write!(f, "quit"),
        }
    }
}

/// Key name -> command table
#[derive(Debug, Clone)]
pub struct Keymap {
    bindings: HashMap<String, Command>,
}

impl Default for Keymap {
    fn default() -> Self {
        Self::new(crate::suggest::DEFAULT_MAX_SUGGESTIONS)
    }
}

impl Keymap {
    /// Built-in bindings with digit keys `1..=max_suggestions` (at most 9)
    /// selecting suggestions
    pub fn new(max_suggestions: usize) -> Self {
        let mut bindings = HashMap::from([
            ("enter".to_string(), Command::Commit),
            ("space".to_string(), Command::Space),
            ("backspace".to_string(), Command::Backspace),
            ("delete".to_string(), Command::Clear),
            ("tab".to_string(), Command::Speak),
            ("s".to_string(), Command::SaveCanvas),
            ("esc".to_string(), Command::Terminate),
            ("ctrl+c".to_string(), Command::Terminate),
        ]);
        for i in 0..max_suggestions.min(9) {
            bindings.insert((i + 1).to_string(), Command::SelectSuggestion(i));
        }
        Self { bindings }
    }

    /// Built-in bindings with `overrides` (key name -> action name) applied
    pub fn with_overrides(
        max_suggestions: usize,
        overrides: &HashMap<String, String>,
    ) -> Result<Self, CommandParseError> {
        let mut keymap = Self::new(max_suggestions);
        for (key, action) in overrides {
            let key = normalize_key_name(key)?;
            keymap.bindings.insert(key, action.parse()?);
        }
        Ok(keymap)
    }

    pub fn get(&self, key: &str) -> Option<Command> {
        self.bindings.get(key).copied()
    }

    pub fn lookup(&self, event: &KeyEvent) -> Option<Command> {
        key_name(event).and_then(|name| self.get(&name))
    }

    /// Bindings sorted by key name, for the help text
    pub fn describe(&self) -> Vec<(String, Command)> {
        let mut pairs: Vec<(String, Command)> = self
            .bindings
            .iter()
            .map(|(k, c)| (k.clone(), *c))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }
}

/// Canonical name of a key event, e.g. `enter`, `ctrl+c`, `f5`, `s`
pub fn key_name(event: &KeyEvent) -> Option<String> {
    let ctrl = event.modifiers.contains(KeyModifiers::CONTROL);
    let base = match event.code {
        KeyCode::Enter => "enter".to_string(),
        KeyCode::Tab => "tab".to_string(),
        KeyCode::Backspace => "backspace".to_string(),
        KeyCode::Delete => "delete".to_string(),
        KeyCode::Esc => "esc".to_string(),
        KeyCode::Char(' ') => "space".to_string(),
        KeyCode::Char(c) => c.to_lowercase().to_string(),
        KeyCode::F(n) => format!("f{}", n),
        _ => return None,
    };
    Some(if ctrl { format!("ctrl+{}", base) } else { base })
}

fn normalize_key_name(key: &str) -> Result<String, CommandParseError> {
    let key = key.trim().to_lowercase();
    let base = key.strip_prefix("ctrl+").unwrap_or(&key);
    let known = matches!(
        base,
        "enter" | "tab" | "backspace" | "delete" | "esc" | "space"
    ) || base.chars().count() == 1
        || base
            .strip_prefix('f')
            .is_some_and(|n| n.parse::<u8>().is_ok());
    if known {
        Ok(key)
    } else {
        Err(CommandParseError::UnknownKey(key))
    }
}
