//! Character vocabulary for the recurrent model
//!
//! Maps characters to model token indices and back. Lookups never fail:
//! anything outside the vocabulary is replaced by the space character.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{GenerationError, Result};

/// Character substituted for every vocabulary miss
pub const FALLBACK_CHAR: char = ' ';

/// Bidirectional character ↔ index table.
///
/// ## Invariants
/// - `char_to_index` and `index_to_char` are exact inverses
/// - `FALLBACK_CHAR` is always present
#[derive(Debug, Clone)]
pub struct Vocabulary {
    char_to_index: HashMap<char, usize>,
    index_to_char: HashMap<usize, char>,
    fallback_index: usize,
}

impl Vocabulary {
    /// Build a vocabulary from `(char, index)` pairs.
    ///
    /// # Errors
    /// Fails when a character or an index appears twice, or when the space
    /// character is missing.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (char, usize)>,
    {
        let mut char_to_index = HashMap::new();
        let mut index_to_char = HashMap::new();

        for (ch, index) in pairs {
            if char_to_index.insert(ch, index).is_some() {
                return Err(GenerationError::VocabularyLoad(format!(
                    "duplicate character {:?}",
                    ch
                )));
            }
            if let Some(previous) = index_to_char.insert(index, ch) {
                return Err(GenerationError::VocabularyLoad(format!(
                    "index {} assigned to both {:?} and {:?}",
                    index, previous, ch
                )));
            }
        }

        let fallback_index = *char_to_index.get(&FALLBACK_CHAR).ok_or_else(|| {
            GenerationError::VocabularyLoad("vocabulary has no space entry".to_string())
        })?;

        Ok(Self {
            char_to_index,
            index_to_char,
            fallback_index,
        })
    }

    /// Parse a JSON object of the form `{"a": 0, "b": 1, ...}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: HashMap<String, usize> = serde_json::from_str(json)
            .map_err(|e| GenerationError::VocabularyLoad(e.to_string()))?;

        let mut pairs = Vec::with_capacity(raw.len());
        for (key, index) in raw {
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => pairs.push((ch, index)),
                _ => {
                    return Err(GenerationError::VocabularyLoad(format!(
                        "key {:?} is not a single character",
                        key
                    )));
                }
            }
        }

        Self::from_pairs(pairs)
    }

    /// Load a vocabulary JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            GenerationError::VocabularyLoad(format!("{}: {}", path.display(), e))
        })?;
        let vocab = Self::from_json_str(&content)?;
        tracing::info!(
            "Loaded vocabulary of {} characters from {}",
            vocab.len(),
            path.display()
        );
        Ok(vocab)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.char_to_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.char_to_index.is_empty()
    }

    /// Index used for characters outside the vocabulary
    pub fn fallback_index(&self) -> usize {
        self.fallback_index
    }

    /// Exact lookup without fallback
    pub fn index_of(&self, ch: char) -> Option<usize> {
        self.char_to_index.get(&ch).copied()
    }

    /// Encode text into token indices, one per character.
    pub fn encode(&self, text: &str) -> Vec<usize> {
        text.chars()
            .map(|ch| self.index_of(ch).unwrap_or(self.fallback_index))
            .collect()
    }

    /// Decode a single index.
    pub fn decode(&self, index: usize) -> char {
        self.index_to_char
            .get(&index)
            .copied()
            .unwrap_or(FALLBACK_CHAR)
    }

    /// Decode a sequence of indices.
    pub fn decode_all(&self, indices: &[usize]) -> String {
        indices.iter().map(|&i| self.decode(i)).collect()
    }

    /// All characters ordered by index
    pub fn chars(&self) -> Vec<char> {
        let mut entries: Vec<(usize, char)> =
            self.index_to_char.iter().map(|(&i, &c)| (i, c)).collect();
        entries.sort_unstable_by_key(|&(i, _)| i);
        entries.into_iter().map(|(_, c)| c).collect()
    }
}
