//! Prefix-based word suggestions for the sentence being composed
//!
//! The dictionary is an ordered set of upper-case words, so every lookup is a
//! range scan starting at the typed prefix and suggestions always come back
//! in lexicographic order.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("failed to read dictionary {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Immutable set of canonical (upper-case) words
#[derive(Debug, Default, Clone)]
pub struct Dictionary {
    words: BTreeSet<String>,
}

impl Dictionary {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .filter_map(|w| canonical(w.as_ref()))
            .collect();
        Self { words }
    }

    /// Load a word list with one word per line
    pub fn load(path: &Path) -> Result<Self, DictionaryError> {
        let file = File::open(path).map_err(|source| DictionaryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file)).map_err(|source| DictionaryError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut words = BTreeSet::new();
        for line in reader.lines() {
            if let Some(word) = canonical(&line?) {
                words.insert(word);
            }
        }
        Ok(Self { words })
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words starting with `prefix` (already canonical), in order
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.words
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |w| w.starts_with(prefix))
            .map(String::as_str)
    }
}

fn canonical(word: &str) -> Option<String> {
    let word = word.trim();
    if word.is_empty() {
        None
    } else {
        Some(word.to_uppercase())
    }
}

/// Computes bounded suggestion lists for a sentence
#[derive(Debug, Clone, Copy)]
pub struct SuggestionEngine {
    max: usize,
}

impl Default for SuggestionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SUGGESTIONS)
    }
}

impl SuggestionEngine {
    pub fn new(max: usize) -> Self {
        Self { max }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Dictionary words extending the last token of `sentence`
    pub fn suggest(&self, sentence: &str, dictionary: &Dictionary) -> Vec<String> {
        let Some(token) = last_token(sentence) else {
            return Vec::new();
        };
        let prefix = token.to_uppercase();
        dictionary
            .with_prefix(&prefix)
            .take(self.max)
            .map(String::from)
            .collect()
    }
}

/// Last whitespace-delimited token, if any
pub fn last_token(sentence: &str) -> Option<&str> {
    sentence.split_whitespace().next_back()
}

/// Replace the last token of `sentence` with `word` and append one space.
///
/// Everything before the last token is kept byte for byte. A sentence with no
/// token is returned unchanged.
pub fn apply(sentence: &str, word: &str) -> String {
    let trimmed = sentence.trim_end();
    if trimmed.is_empty() {
        return sentence.to_string();
    }
    let start = trimmed
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);

    let mut out = String::with_capacity(start + word.len() + 1);
    out.push_str(&trimmed[..start]);
    out.push_str(word);
    out.push(' ');
    out
}
