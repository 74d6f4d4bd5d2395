//! Sentence composition driven by classifier labels
//!
//! Every edit ends by recomputing the suggestion list, so `suggestions()`
//! always reflects the current sentence. All edits are total: editing an
//! empty sentence or committing without a label is a no-op.

use crate::suggest::{self, Dictionary, SuggestionEngine};
use std::sync::Arc;

pub struct TextComposer {
    sentence: String,
    last_label: Option<String>,
    suggestions: Vec<String>,
    engine: SuggestionEngine,
    dictionary: Arc<Dictionary>,
}

impl TextComposer {
    pub fn new(dictionary: Arc<Dictionary>, engine: SuggestionEngine) -> Self {
        Self {
            sentence: String::new(),
            last_label: None,
            suggestions: Vec::new(),
            engine,
            dictionary,
        }
    }

    pub fn sentence(&self) -> &str {
        &self.sentence
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn last_label(&self) -> Option<&str> {
        self.last_label.as_deref()
    }

    /// Record the label produced by the current tick
    pub fn set_label(&mut self, label: Option<String>) {
        self.last_label = label;
    }

    /// Append the last label. Returns whether the sentence changed.
    pub fn commit(&mut self) -> bool {
        let changed = match &self.last_label {
            Some(label) if !label.is_empty() => {
                self.sentence.push_str(label);
                true
            }
            _ => false,
        };
        self.refresh();
        changed
    }

    pub fn space(&mut self) -> bool {
        self.sentence.push(' ');
        self.refresh();
        true
    }

    pub fn backspace(&mut self) -> bool {
        let changed = self.sentence.pop().is_some();
        self.refresh();
        changed
    }

    pub fn clear(&mut self) -> bool {
        let changed = !self.sentence.is_empty();
        self.sentence.clear();
        self.refresh();
        changed
    }

    /// Replace the word being typed with suggestion `index`
    pub fn select_suggestion(&mut self, index: usize) -> bool {
        let changed = match self.suggestions.get(index) {
            Some(word) => {
                self.sentence = suggest::apply(&self.sentence, word);
                true
            }
            None => false,
        };
        self.refresh();
        changed
    }

    fn refresh(&mut self) {
        self.suggestions = self.engine.suggest(&self.sentence, &self.dictionary);
    }
}
