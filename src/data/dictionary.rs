//! Categorical vocabularies.
//!
//! A [`Dictionary`] maps string tokens to dense integer codes. Code 0 is
//! reserved for the out-of-vocabulary sentinel; tokens observed fewer than
//! `min_vocab_frequency` times, or beyond the `max_vocab_count` most
//! frequent tokens, collapse to it. The vocabulary is frozen once built.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Code of the out-of-vocabulary sentinel.
pub const OOV_CODE: u32 = 0;

/// Display token of the out-of-vocabulary sentinel.
pub const OOV_TOKEN: &str = "<OOV>";

/// `max_vocab_count` value meaning "unlimited".
pub const UNLIMITED_VOCAB: i32 = -1;

/// A frozen token → code mapping for one categorical column.
///
/// Serializes as the token list alone; the reverse index is rebuilt on
/// deserialization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Dictionary {
    /// Tokens by code. Index 0 is always [`OOV_TOKEN`].
    tokens: Vec<String>,
    /// Reverse lookup. Does not contain the OOV token.
    index: HashMap<String, u32>,
}

impl From<Vec<String>> for Dictionary {
    fn from(tokens: Vec<String>) -> Self {
        Self::from_tokens(tokens)
    }
}

impl From<Dictionary> for Vec<String> {
    fn from(dictionary: Dictionary) -> Self {
        dictionary.tokens
    }
}

impl Dictionary {
    /// Build a vocabulary from observed tokens.
    ///
    /// Tokens are ranked by descending frequency (ties broken by token
    /// order, so the result is deterministic). Tokens below
    /// `min_vocab_frequency` or past the `max_vocab_count` most frequent
    /// ones are dropped and will map to [`OOV_CODE`].
    pub fn build<'a>(
        observed: impl IntoIterator<Item = &'a str>,
        min_vocab_frequency: u32,
        max_vocab_count: i32,
    ) -> Self {
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for token in observed {
            *counts.entry(token).or_default() += 1;
        }

        let mut ranked: Vec<(&str, u64)> = counts
            .into_iter()
            .filter(|(_, count)| *count >= min_vocab_frequency.max(1) as u64)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        if max_vocab_count != UNLIMITED_VOCAB {
            ranked.truncate(max_vocab_count.max(0) as usize);
        }

        let mut tokens = Vec::with_capacity(ranked.len() + 1);
        tokens.push(OOV_TOKEN.to_string());
        tokens.extend(ranked.into_iter().map(|(token, _)| token.to_string()));

        Self::from_tokens(tokens)
    }

    fn from_tokens(tokens: Vec<String>) -> Self {
        let index = tokens
            .iter()
            .enumerate()
            .skip(1)
            .map(|(code, token)| (token.clone(), code as u32))
            .collect();
        Self { tokens, index }
    }

    /// Code for a token; [`OOV_CODE`] when the token is not in vocabulary.
    pub fn code(&self, token: &str) -> u32 {
        self.index.get(token).copied().unwrap_or(OOV_CODE)
    }

    /// Token for a code, if the code is in range.
    pub fn token(&self, code: u32) -> Option<&str> {
        self.tokens.get(code as usize).map(String::as_str)
    }

    /// Number of codes, including the OOV sentinel.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Always false: the OOV sentinel is always present.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// In-vocabulary tokens (excluding the OOV sentinel), by code order.
    pub fn vocabulary(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().skip(1).map(String::as_str)
    }

}
