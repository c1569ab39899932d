//! Append-only vocabularies for categorical attributes

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// Canonical lookup key of a raw categorical value: trimmed and case-folded
pub fn canonical_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Ordered set of observed values of one attribute, each mapped to a code.
///
/// Codes are dense and allocated in first-seen order. A code, once handed out,
/// is never reassigned: the vocabulary only grows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct AttributeVocabulary {
    /// Code -> first spelling seen
    values: Vec<String>,
    /// Canonical key -> code
    codes: AHashMap<String, u32>,
}

impl AttributeVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vocabulary pre-seeded with documented values in code order
    pub fn seeded<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocabulary = Self::new();
        for value in values {
            vocabulary.get_or_insert(value.as_ref());
        }
        vocabulary
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn code_of(&self, raw: &str) -> Option<u32> {
        self.codes.get(&canonical_key(raw)).copied()
    }

    /// Look up `raw`, appending it with the next free code if unseen.
    /// Returns the code and whether it was newly allocated.
    pub fn get_or_insert(&mut self, raw: &str) -> (u32, bool) {
        let key = canonical_key(raw);
        if let Some(&code) = self.codes.get(&key) {
            return (code, false);
        }
        let code = self.values.len() as u32;
        self.values.push(raw.trim().to_string());
        self.codes.insert(key, code);
        (code, true)
    }

    pub fn value(&self, code: u32) -> Option<&str> {
        self.values.get(code as usize).map(String::as_str)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

impl PartialEq for AttributeVocabulary {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl From<Vec<String>> for AttributeVocabulary {
    fn from(values: Vec<String>) -> Self {
        Self::seeded(values)
    }
}

impl From<AttributeVocabulary> for Vec<String> {
    fn from(vocabulary: AttributeVocabulary) -> Self {
        vocabulary.values
    }
}
