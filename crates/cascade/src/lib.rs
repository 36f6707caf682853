//! Similarity cascade for fingerprint-colliding pairs.
//!
//! Two texts that share a [`Fingerprint`](canonical::Fingerprint) use the
//! same letters, but most such pairs are boring: exact duplicates, retweets
//! with a typo fixed, or the same words shuffled. The cascade runs four cheap
//! heuristics in order and stops at the first one that rejects:
//!
//! 1. [`char_diff`]: too many letters in the same position
//! 2. [`word_diff`]: too many whole words in common
//! 3. [`combined_words`]: words merged without spaces
//! 4. [`greedy_removal`]: long words of one text found inside the other,
//!    checked in both directions
//!
//! ```
//! use cascade::{Cascade, Stage, Verdict};
//!
//! let cascade = Cascade::default();
//! assert!(cascade.is_interesting_anagram("listen", "silent"));
//! assert_eq!(
//!     cascade.verdict("hello world", "hello world"),
//!     Verdict::Rejected(Stage::CharDiff)
//! );
//! ```

mod checks;
pub mod config;

pub use crate::checks::{
    char_diff, combined_words, greedy_removal, greedy_removal_one_way, word_diff,
};
pub use crate::config::{CascadeConfig, CascadeError};

use serde::{Deserialize, Serialize};

/// Cascade stage, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CharDiff,
    WordDiff,
    CombinedWords,
    GreedyRemoval,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CharDiff => "char_diff",
            Stage::WordDiff => "word_diff",
            Stage::CombinedWords => "combined_words",
            Stage::GreedyRemoval => "greedy_removal",
        }
    }
}

/// Outcome of running the cascade on one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Interesting,
    /// Rejected by the named stage; later stages did not run.
    Rejected(Stage),
}

impl Verdict {
    pub fn is_interesting(&self) -> bool {
        matches!(self, Verdict::Interesting)
    }
}

/// The configured cascade. Cheap to copy.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Cascade {
    config: CascadeConfig,
}

impl Cascade {
    pub fn new(config: CascadeConfig) -> Result<Self, CascadeError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    pub fn verdict(&self, one: &str, two: &str) -> Verdict {
        let cfg = &self.config;
        if !char_diff(one, two, cfg.char_diff_cutoff) {
            return Verdict::Rejected(Stage::CharDiff);
        }
        if !word_diff(one, two, cfg.word_diff_cutoff) {
            return Verdict::Rejected(Stage::WordDiff);
        }
        if !combined_words(one, two, cfg.combined_words_cutoff) {
            return Verdict::Rejected(Stage::CombinedWords);
        }
        if !greedy_removal(one, two, cfg.greedy_cutoff) {
            return Verdict::Rejected(Stage::GreedyRemoval);
        }
        Verdict::Interesting
    }

    pub fn is_interesting_anagram(&self, one: &str, two: &str) -> bool {
        self.verdict(one, two).is_interesting()
    }
}

/// Run the cascade with default cutoffs.
pub fn is_interesting_anagram(one: &str, two: &str) -> bool {
    Cascade::default().is_interesting_anagram(one, two)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAIRS: &[(&str, &str)] = &[
        ("So bored all the time", "Berit od hates me lol"),
        ("Lord Jesus it's a fart", "It's just sad forreal"),
        ("Moist as heck in here", "He The Reason Im Sick ."),
        ("Freight is so pathetic.", "straight piece of shit"),
        ("Cheetah girls two is on !", "I Got One Class With Her."),
    ];

    #[test]
    fn real_pairs_are_interesting() {
        let cascade = Cascade::default();
        for (one, two) in PAIRS {
            assert_eq!(canonical::fingerprint(one), canonical::fingerprint(two));
            assert!(cascade.is_interesting_anagram(one, two), "{one} / {two}");
            assert!(cascade.is_interesting_anagram(two, one), "{two} / {one}");
        }
    }

    #[test]
    fn exact_duplicates_are_rejected() {
        for text in ["listen", "hello world", "So bored all the time", "x"] {
            assert!(!is_interesting_anagram(text, text), "{text}");
        }
    }

    #[test]
    fn verdict_names_the_first_failing_stage() {
        let cascade = Cascade::default();
        assert_eq!(cascade.verdict("listen", "silent"), Verdict::Interesting);
        assert_eq!(
            cascade.verdict("the cat dog runs", "catdog the runs"),
            Verdict::Rejected(Stage::CharDiff)
        );
        assert_eq!(
            cascade.verdict("the cat sat", "sat the cat"),
            Verdict::Rejected(Stage::WordDiff)
        );
    }

    #[test]
    fn char_and_word_stages_are_symmetric() {
        let texts = [
            "listen", "silent", "the cat sat", "sat the cat", "a gentleman", "elegant man",
            "slot machines", "cash lost in me",
        ];
        let cfg = CascadeConfig::default();
        for a in texts {
            for b in texts {
                assert_eq!(char_diff(a, b, cfg.char_diff_cutoff), char_diff(b, a, cfg.char_diff_cutoff));
                assert_eq!(word_diff(a, b, cfg.word_diff_cutoff), word_diff(b, a, cfg.word_diff_cutoff));
            }
        }
    }

    #[test]
    fn invalid_config_is_refused() {
        let cfg = CascadeConfig::default().with_word_diff_cutoff(2.0);
        assert!(Cascade::new(cfg).is_err());
    }

    #[test]
    fn looser_cutoffs_admit_more_pairs() {
        let strict = Cascade::default();
        let loose = Cascade::new(CascadeConfig::default().with_greedy_cutoff(0.0)).unwrap();
        assert_eq!(
            strict.verdict("panther cow", "the cowpan r"),
            Verdict::Rejected(Stage::GreedyRemoval)
        );
        assert!(loose.is_interesting_anagram("panther cow", "the cowpan r"));
    }
}
