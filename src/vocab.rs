//! Vocabulary normalisation and matching.
//!
//! Speech text and configured word lists are normalised the same way
//! before comparison: lowercased, punctuation folded to spaces, whitespace
//! collapsed. Variants like "I'm" and "Im" therefore collapse to the same
//! normalised form and need no special casing at match time.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Folds text into its canonical matching form.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            folded.extend(ch.to_lowercase());
        } else {
            folded.push(' ');
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// How a vocabulary is compared against normalised speech text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Entries match only on word boundaries ("bad" does not match "badge").
    WholeWord,
    /// Entries match anywhere in the text.
    Substring,
}

/// A compiled word/phrase list.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    entries: Vec<String>,
    mode: MatchMode,
    pattern: Option<Regex>,
}

impl Vocabulary {
    /// Normalises and compiles a word list.
    ///
    /// Entries that normalise to the empty string are discarded; an empty
    /// resulting list is a configuration error (`context` names the
    /// offending config section).
    pub fn compile(
        words: &[String],
        mode: MatchMode,
        context: &str,
    ) -> Result<Self, ConfigError> {
        let entries: Vec<String> = words
            .iter()
            .map(|w| normalize(w))
            .filter(|w| !w.is_empty())
            .collect();

        if entries.is_empty() {
            return Err(ConfigError::EmptyVocabulary {
                context: context.to_string(),
            });
        }

        let pattern = match mode {
            MatchMode::WholeWord => {
                let alternation = entries
                    .iter()
                    .map(|e| regex::escape(e))
                    .collect::<Vec<_>>()
                    .join("|");
                let source = format!(r"\b(?:{alternation})\b");
                Some(Regex::new(&source).map_err(|e| ConfigError::PatternCompile {
                    message: e.to_string(),
                })?)
            }
            MatchMode::Substring => None,
        };

        Ok(Self {
            entries,
            mode,
            pattern,
        })
    }

    /// Tests whether any entry matches the given raw text.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.find(text).is_some()
    }

    /// Returns the first matching normalised entry, if any.
    #[must_use]
    pub fn find(&self, text: &str) -> Option<&str> {
        let normalised = normalize(text);
        if normalised.is_empty() {
            return None;
        }

        match self.mode {
            MatchMode::WholeWord => {
                let pattern = self.pattern.as_ref()?;
                let found = pattern.find(&normalised)?;
                let matched = found.as_str();
                self.entries
                    .iter()
                    .find(|e| e.as_str() == matched)
                    .map(String::as_str)
            }
            MatchMode::Substring => self
                .entries
                .iter()
                .find(|e| normalised.contains(e.as_str()))
                .map(String::as_str),
        }
    }

    /// Number of compiled entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries survived normalisation (cannot occur for a
    /// successfully compiled vocabulary).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
