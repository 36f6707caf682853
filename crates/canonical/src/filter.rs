//! Upstream pre-filter: decides which stream messages become candidates.
//!
//! The matcher assumes its input already passed this filter. Cheap structural
//! checks run first, then the text is normalized (entities decoded, accents
//! stripped) and the character-quality ratio is measured on the normalized
//! form.

use crate::config::FilterConfig;
use crate::error::FilterRejection;
use crate::normalize::{normalize_text, stripped, unique_letters};
use crate::record::{CandidateRecord, InboundMessage};

/// Apply the filter policy to `message`.
///
/// On success the returned record carries the normalized text and its
/// fingerprint.
///
/// ```rust
/// use canonical::{prefilter, FilterConfig, FilterRejection, InboundMessage};
///
/// let cfg = FilterConfig::default();
/// let ok = InboundMessage::new(1, "Saturday morning in bed, finally!").with_lang("en");
/// assert!(prefilter(&ok, &cfg).is_ok());
///
/// let link = InboundMessage::new(2, "look at this https://example.com").with_lang("en");
/// assert_eq!(prefilter(&link, &cfg), Err(FilterRejection::Url));
/// ```
pub fn prefilter(
    message: &InboundMessage,
    config: &FilterConfig,
) -> Result<CandidateRecord, FilterRejection> {
    let text = message.text.as_str();

    if let Some(expected) = config.required_lang.as_deref() {
        if message.lang.as_deref() != Some(expected) {
            return Err(FilterRejection::Language {
                expected: expected.to_owned(),
                found: message.lang.clone(),
            });
        }
    }
    if config.reject_mentions && has_mention(text) {
        return Err(FilterRejection::Mention);
    }
    if config.reject_retweets && (message.is_retweet || text.starts_with("RT @")) {
        return Err(FilterRejection::Retweet);
    }
    if config.reject_urls && has_url(text) {
        return Err(FilterRejection::Url);
    }
    if config.reject_digits && text.bytes().any(|b| b.is_ascii_digit()) {
        return Err(FilterRejection::Digits);
    }

    let letters = stripped(text);
    if letters.is_empty() || letters.len() <= config.low_letter_cutoff {
        return Err(FilterRejection::TooShort {
            letters: letters.len(),
            cutoff: config.low_letter_cutoff,
        });
    }
    let unique = unique_letters(&letters);
    if unique <= config.low_unique_cutoff {
        return Err(FilterRejection::TooFewUniqueLetters {
            unique,
            cutoff: config.low_unique_cutoff,
        });
    }

    let normalized = normalize_text(text);
    let ratio = nice_ratio(&normalized);
    if ratio < config.nice_ratio_cutoff {
        return Err(FilterRejection::LowNiceRatio {
            ratio,
            cutoff: config.nice_ratio_cutoff,
        });
    }

    Ok(CandidateRecord::new(message.id, normalized))
}

/// Share of characters that are ASCII letters, spaces or `.,!?"'`.
pub fn nice_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut nice = 0usize;
    for c in text.chars() {
        total += 1;
        if c.is_ascii_alphabetic() || matches!(c, ' ' | '.' | ',' | '!' | '?' | '"' | '\'') {
            nice += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        nice as f64 / total as f64
    }
}

fn has_mention(text: &str) -> bool {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '@' {
            if let Some(&next) = chars.peek() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    return true;
                }
            }
        }
    }
    false
}

fn has_url(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("http://") || lower.contains("https://") || lower.contains("www.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn en(id: u64, text: &str) -> InboundMessage {
        InboundMessage::new(id, text).with_lang("en")
    }

    #[test]
    fn clean_message_passes_and_is_fingerprinted() {
        let cfg = FilterConfig::default();
        let record = prefilter(&en(10, "Moist as heck in here today"), &cfg).unwrap();
        assert_eq!(record.id(), 10);
        assert_eq!(record.text(), "Moist as heck in here today");
        assert_eq!(record.fingerprint(), &crate::fingerprint(record.text()));
    }

    #[test]
    fn language_is_required() {
        let cfg = FilterConfig::default();
        let msg = InboundMessage::new(1, "Bonjour tout le monde, quelle journee");
        assert!(matches!(
            prefilter(&msg, &cfg),
            Err(FilterRejection::Language { found: None, .. })
        ));
        let any_lang = cfg.with_required_lang(None);
        assert!(prefilter(&msg, &any_lang).is_ok());
    }

    #[test]
    fn structural_rejections() {
        let cfg = FilterConfig::default();
        assert_eq!(
            prefilter(&en(1, "thanks @someone for the lovely flowers"), &cfg),
            Err(FilterRejection::Mention)
        );
        assert_eq!(
            prefilter(&en(2, "the best things in life are free honestly").retweet(), &cfg),
            Err(FilterRejection::Retweet)
        );
        assert_eq!(
            prefilter(&en(3, "read this wonderful thing www.example.org"), &cfg),
            Err(FilterRejection::Url)
        );
        assert_eq!(
            prefilter(&en(4, "only seven days until the big party"), &cfg),
            Ok(CandidateRecord::new(4, "only seven days until the big party"))
        );
        assert_eq!(
            prefilter(&en(5, "only 7 days until the big party"), &cfg),
            Err(FilterRejection::Digits)
        );
    }

    #[test]
    fn email_style_at_sign_needs_a_name() {
        assert!(has_mention("hi @bob"));
        assert!(!has_mention("meet @ noon"));
    }

    #[test]
    fn letter_cutoffs_are_exclusive() {
        let cfg = FilterConfig::default();
        // exactly sixteen letters
        let sixteen = en(1, "abcdefghij klmnop");
        assert!(matches!(
            prefilter(&sixteen, &cfg),
            Err(FilterRejection::TooShort { letters: 16, cutoff: 16 })
        ));
        let few_unique = en(2, "banana banana banana banana");
        assert!(matches!(
            prefilter(&few_unique, &cfg),
            Err(FilterRejection::TooFewUniqueLetters { unique: 3, .. })
        ));
    }

    #[test]
    fn unusual_characters_lower_the_ratio() {
        let cfg = FilterConfig::default();
        let emoji_heavy = en(1, "love this song so much \u{1F60D}\u{1F60D}\u{1F60D}\u{1F60D}\u{1F60D}");
        assert!(matches!(
            prefilter(&emoji_heavy, &cfg),
            Err(FilterRejection::LowNiceRatio { .. })
        ));
        assert!((nice_ratio("ab#d") - 0.75).abs() < f64::EPSILON);
        assert_eq!(nice_ratio(""), 0.0);
    }

    #[test]
    fn text_is_normalized_before_matching() {
        let cfg = FilterConfig::default();
        let record = prefilter(&en(1, "cr\u{e8}me br\u{fb}l\u{e9}e &amp; jalape\u{f1}o toast"), &cfg).unwrap();
        assert_eq!(record.text(), "creme brulee & jalapeno toast");
    }

    #[test]
    fn permissive_config_still_needs_letters() {
        let cfg = FilterConfig::permissive();
        assert!(prefilter(&InboundMessage::new(1, "listen"), &cfg).is_ok());
        assert!(matches!(
            prefilter(&InboundMessage::new(2, "!!! 42"), &cfg),
            Err(FilterRejection::TooShort { letters: 0, .. })
        ));
    }
}
