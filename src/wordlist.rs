use std::collections::HashMap;

use rand::Rng;

use crate::error::{EngineError, Result};

pub const BIP39_WORD_COUNT: usize = 2048;

/// Fixed, ordered candidate vocabulary. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct Wordlist {
    words: Vec<String>,
    index: HashMap<String, usize>,
}

impl Wordlist {
    pub fn bip39_english() -> Self {
        let words = bip39::Language::English
            .word_list()
            .iter()
            .map(|w| w.to_string())
            .collect::<Vec<_>>();
        let index = words
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i))
            .collect();
        Self { words, index }
    }

    pub fn from_words<I, S>(words: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Vec::new();
        let mut index = HashMap::new();
        for word in words {
            let word = word.into();
            let trimmed = word.trim();
            if trimmed.is_empty() {
                return Err(EngineError::validation("wordlist contains an empty entry"));
            }
            if index.insert(trimmed.to_string(), list.len()).is_some() {
                return Err(EngineError::validation(format!(
                    "wordlist contains duplicate entry {trimmed:?}"
                )));
            }
            list.push(trimmed.to_string());
        }
        if list.is_empty() {
            return Err(EngineError::validation("wordlist is empty"));
        }
        Ok(Self { words: list, index })
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&str> {
        self.words.get(i).map(String::as_str)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.index.contains_key(word)
    }

    pub fn index_of(&self, word: &str) -> Option<usize> {
        self.index.get(word).copied()
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }

    pub fn random_word<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        &self.words[rng.random_range(0..self.words.len())]
    }
}

impl Default for Wordlist {
    fn default() -> Self {
        Self::bip39_english()
    }
}
