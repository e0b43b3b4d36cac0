//! Known-good spellings and fuzzy correction against them.

use std::path::Path;

use tracing::debug;

use super::{DictionaryWord, normalize_name};
use crate::error::{IngestError, StoreResult};
use crate::store::RosterStore;

/// In-memory copy of the dictionary table for the duration of one command.
#[derive(Clone, Debug, Default)]
pub struct Dictionary {
    words: Vec<DictionaryWord>,
}

impl Dictionary {
    pub fn load(store: &dyn RosterStore) -> StoreResult<Self> {
        Ok(Self::from_words(store.dictionary_words()?))
    }

    pub fn from_words(words: Vec<DictionaryWord>) -> Self {
        Self { words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.iter().any(|w| w.word == word)
    }

    /// Records one more occurrence of `word` in this copy.
    pub fn insert(&mut self, word: &str) {
        match self.words.iter_mut().find(|w| w.word == word) {
            Some(existing) => existing.occurrences += 1,
            None => self.words.push(DictionaryWord {
                word: word.to_string(),
                occurrences: 1,
            }),
        }
    }

    /// Best single correction for `word` within `max_distance` edits.
    ///
    /// Exact entries win outright. Among equally distant candidates the more
    /// frequent spelling wins, then the alphabetically first one, so the result
    /// does not depend on table order.
    pub fn correction(&self, word: &str, max_distance: usize) -> Option<&str> {
        if let Some(exact) = self.words.iter().find(|w| w.word == word) {
            return Some(exact.word.as_str());
        }

        let (distance, best) = self
            .words
            .iter()
            .map(|w| (levenshtein::levenshtein(word, &w.word), w))
            .filter(|(distance, _)| *distance <= max_distance)
            .min_by(|(da, a), (db, b)| {
                da.cmp(db)
                    .then(b.occurrences.cmp(&a.occurrences))
                    .then(a.word.cmp(&b.word))
            })?;

        debug!("Corrected '{}' to '{}' (distance {})", word, best.word, distance);
        Some(best.word.as_str())
    }
}

/// Reads a newline-delimited list of spellings, lowercased, blanks skipped.
pub fn read_seed_file(path: &Path) -> Result<Vec<String>, IngestError> {
    let bytes = std::fs::read(path).map_err(|error| IngestError::DictionaryRead {
        path: path.to_path_buf(),
        error,
    })?;
    let text = String::from_utf8(bytes).map_err(|error| IngestError::DictionaryEncoding {
        path: path.to_path_buf(),
        error,
    })?;
    Ok(text
        .lines()
        .map(normalize_name)
        .filter(|word| !word.is_empty())
        .collect())
}
