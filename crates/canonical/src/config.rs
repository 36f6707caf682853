//! Configuration for the upstream pre-filter.
//!
//! # Examples
//!
//! ```rust
//! use canonical::FilterConfig;
//!
//! let config = FilterConfig::default();
//! assert_eq!(config.required_lang.as_deref(), Some("en"));
//! assert_eq!(config.low_letter_cutoff, 16);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::CanonicalError;

/// Thresholds and switches applied by [`prefilter`](crate::prefilter).
///
/// Letter and unique-letter cutoffs are exclusive: a message needs strictly
/// more than `low_letter_cutoff` letters to pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    /// Language tag a message must carry. `None` accepts any language,
    /// including untagged messages.
    pub required_lang: Option<String>,
    /// Messages with this many letters or fewer are rejected.
    pub low_letter_cutoff: usize,
    /// Messages with this many distinct letters or fewer are rejected.
    pub low_unique_cutoff: usize,
    /// Minimum share of letters, spaces and basic punctuation in the text.
    pub nice_ratio_cutoff: f64,
    pub reject_digits: bool,
    pub reject_mentions: bool,
    pub reject_urls: bool,
    pub reject_retweets: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            required_lang: Some("en".to_string()),
            low_letter_cutoff: 16,
            low_unique_cutoff: 11,
            nice_ratio_cutoff: 0.85,
            reject_digits: true,
            reject_mentions: true,
            reject_urls: true,
            reject_retweets: true,
        }
    }
}

impl FilterConfig {
    /// Accept everything that has at least one letter. Handy for tests and
    /// for feeding pre-cleaned corpora.
    pub fn permissive() -> Self {
        Self {
            required_lang: None,
            low_letter_cutoff: 0,
            low_unique_cutoff: 0,
            nice_ratio_cutoff: 0.0,
            reject_digits: false,
            reject_mentions: false,
            reject_urls: false,
            reject_retweets: false,
        }
    }

    pub fn with_required_lang(mut self, lang: Option<&str>) -> Self {
        self.required_lang = lang.map(str::to_owned);
        self
    }

    pub fn with_low_letter_cutoff(mut self, cutoff: usize) -> Self {
        self.low_letter_cutoff = cutoff;
        self
    }

    pub fn with_nice_ratio_cutoff(mut self, cutoff: f64) -> Self {
        self.nice_ratio_cutoff = cutoff;
        self
    }

    pub fn validate(&self) -> Result<(), CanonicalError> {
        if !(0.0..=1.0).contains(&self.nice_ratio_cutoff) {
            return Err(CanonicalError::InvalidConfig(format!(
                "nice_ratio_cutoff must be within [0, 1], got {}",
                self.nice_ratio_cutoff
            )));
        }
        if self.low_unique_cutoff >= 26 {
            return Err(CanonicalError::InvalidConfig(format!(
                "low_unique_cutoff {} rejects every message",
                self.low_unique_cutoff
            )));
        }
        if matches!(self.required_lang.as_deref(), Some("")) {
            return Err(CanonicalError::InvalidConfig(
                "required_lang must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(FilterConfig::default().validate().is_ok());
        assert!(FilterConfig::permissive().validate().is_ok());
    }

    #[test]
    fn out_of_range_ratio_is_rejected() {
        let cfg = FilterConfig::default().with_nice_ratio_cutoff(1.5);
        assert!(matches!(cfg.validate(), Err(CanonicalError::InvalidConfig(_))));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: FilterConfig = serde_json::from_str(r#"{"low_letter_cutoff": 8}"#).unwrap();
        assert_eq!(cfg.low_letter_cutoff, 8);
        assert_eq!(cfg.low_unique_cutoff, 11);
        assert!(cfg.reject_urls);
    }
}
