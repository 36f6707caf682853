//! Configuration and error types for the similarity cascade.
//!
//! Every cutoff is a fraction in `[0, 1]`. The defaults are the values the
//! cascade was tuned with on live English-language streams; treat them as a
//! starting point rather than constants.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cutoffs for the four cascade stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CascadeConfig {
    /// Reject when this share (or more) of letter positions line up.
    pub char_diff_cutoff: f64,
    /// Reject when this share (or more) of the shorter word list is shared.
    pub word_diff_cutoff: f64,
    /// Pass only when more than this share of the longer word list's letters
    /// survives removing its words from the shorter text.
    pub combined_words_cutoff: f64,
    /// Reject when less than this share of letters survives greedy word
    /// removal, in either direction.
    pub greedy_cutoff: f64,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            char_diff_cutoff: 0.3,
            word_diff_cutoff: 0.3,
            combined_words_cutoff: 0.5,
            greedy_cutoff: 0.8,
        }
    }
}

impl CascadeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_char_diff_cutoff(mut self, cutoff: f64) -> Self {
        self.char_diff_cutoff = cutoff;
        self
    }

    pub fn with_word_diff_cutoff(mut self, cutoff: f64) -> Self {
        self.word_diff_cutoff = cutoff;
        self
    }

    pub fn with_combined_words_cutoff(mut self, cutoff: f64) -> Self {
        self.combined_words_cutoff = cutoff;
        self
    }

    pub fn with_greedy_cutoff(mut self, cutoff: f64) -> Self {
        self.greedy_cutoff = cutoff;
        self
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), CascadeError> {
        let cutoffs = [
            ("char_diff_cutoff", self.char_diff_cutoff),
            ("word_diff_cutoff", self.word_diff_cutoff),
            ("combined_words_cutoff", self.combined_words_cutoff),
            ("greedy_cutoff", self.greedy_cutoff),
        ];
        for (name, value) in cutoffs {
            if !(0.0..=1.0).contains(&value) {
                return Err(CascadeError::InvalidCutoff { name, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CascadeError {
    #[error("{name} must be within [0, 1], got {value}")]
    InvalidCutoff { name: &'static str, value: f64 },
}
