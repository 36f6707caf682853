//! Letter-multiset fingerprints.
//!
//! A [`Fingerprint`] is a compact, printable key derived from the count of
//! each ASCII letter in a text. Two texts that are permutations of the same
//! letters (ignoring case, spacing, punctuation and digits) always share a
//! fingerprint, which is what makes anagram candidates findable with a single
//! map lookup.
//!
//! # Encoding
//!
//! Letters are visited from most to least common in English text
//! (`e t a o i n ...  x q z`). Each visited letter contributes one byte:
//!
//! - `b'@' + min(count, 48)` when the letter is present
//! - `b'@'` when it is absent but a rarer letter is still to come
//!
//! Encoding stops after the rarest letter that is present, so short texts get
//! short keys and the tail of every key describes its rarest letters. Keys are
//! padded with one `'@'` to an even length. Text without any letters maps to
//! the sentinel [`EMPTY_FINGERPRINT`].
//!
//! ```text
//! "listen" -> e t a o i n s h r d l
//!             A A @ @ A A A @ @ @ A  + '@' padding  = "AA@@AAA@@@A@"
//! ```
//!
//! Counts above 48 are clamped, so very long texts with different counts of a
//! single letter can collide. The similarity cascade rejects those pairs.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Letters ordered from most to least common in English text.
pub const LETTERS_BY_FREQUENCY: [u8; 26] = *b"etaoinshrdlcumwfgypbvkjxqz";

/// Byte value of an empty slot; present letters are encoded as an offset from it.
pub const SLOT_BASE: u8 = b'@';

/// Largest per-letter count that the encoding distinguishes.
pub const MAX_SLOT_COUNT: u8 = 48;

/// Fingerprint of a text that contains no letters at all.
pub const EMPTY_FINGERPRINT: &str = "@@";

/// Canonical key for a text's letter multiset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of `text`. Same as [`fingerprint`].
    pub fn of(text: &str) -> Self {
        fingerprint(text)
    }

    /// Wrap a key that was previously produced by [`fingerprint`], e.g. one
    /// read back from a storage backend.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Total number of letters encoded in this key.
    pub fn letter_count(&self) -> usize {
        letter_count(&self.0)
    }

    /// True for the key of letter-free input.
    pub fn is_empty_sentinel(&self) -> bool {
        self.0 == EMPTY_FINGERPRINT
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Fingerprint {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[inline]
fn slot(letter: u8) -> usize {
    (letter - b'a') as usize
}

/// Compute the letter-multiset fingerprint of `text`.
///
/// Pure function of the text: non-ASCII characters, digits, whitespace and
/// punctuation are ignored and case is folded.
pub fn fingerprint(text: &str) -> Fingerprint {
    let mut counts = [0u32; 26];
    // Multi-byte UTF-8 sequences never contain ASCII bytes.
    for byte in text.bytes() {
        if byte.is_ascii_alphabetic() {
            counts[slot(byte.to_ascii_lowercase())] += 1;
        }
    }

    let Some(rarest_present) = LETTERS_BY_FREQUENCY
        .iter()
        .rposition(|&letter| counts[slot(letter)] > 0)
    else {
        return Fingerprint(EMPTY_FINGERPRINT.to_string());
    };

    let mut key = String::with_capacity(rarest_present + 2);
    for &letter in &LETTERS_BY_FREQUENCY[..=rarest_present] {
        let count = counts[slot(letter)].min(u32::from(MAX_SLOT_COUNT)) as u8;
        key.push(char::from(SLOT_BASE + count));
    }
    if key.len() % 2 == 1 {
        key.push(char::from(SLOT_BASE));
    }
    Fingerprint(key)
}

/// Decode the total letter count from a fingerprint key.
///
/// Used by maintenance passes that drop stored candidates below a minimum
/// length without access to the original text. Clamped slots decode as 48.
pub fn letter_count(key: &str) -> usize {
    key.bytes()
        .map(|b| usize::from(b.saturating_sub(SLOT_BASE)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permutations_share_a_fingerprint() {
        assert_eq!(fingerprint("listen"), fingerprint("silent"));
        assert_eq!(fingerprint("Dormitory"), fingerprint("dirty room!!"));
        assert_eq!(fingerprint("Twelve plus one"), fingerprint("eleven plus two"));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog";
        assert_eq!(fingerprint(text), fingerprint(text));
        assert_eq!(Fingerprint::of(text), fingerprint(text));
    }

    #[test]
    fn different_multisets_differ() {
        assert_ne!(fingerprint("aabbcc"), fingerprint("aabbcd"));
        assert_ne!(fingerprint("stop"), fingerprint("stops"));
    }

    #[test]
    fn listen_encodes_as_documented() {
        assert_eq!(fingerprint("listen").as_str(), "AA@@AAA@@@A@");
    }

    #[test]
    fn key_is_truncated_after_rarest_letter() {
        // 'e' is the most common letter, so the key is a single slot plus padding.
        assert_eq!(fingerprint("eee").as_str(), "C@");
        // 'z' is the rarest letter, so every slot is emitted.
        let key = fingerprint("z");
        assert_eq!(key.as_str().len(), 26);
        assert!(key.as_str().ends_with('A'));
    }

    #[test]
    fn keys_have_even_length() {
        for text in ["a", "at", "eat", "tea time", "quiz", "rhythm"] {
            assert_eq!(fingerprint(text).as_str().len() % 2, 0, "{text}");
        }
    }

    #[test]
    fn case_spacing_and_punctuation_are_ignored() {
        assert_eq!(fingerprint("A gentleman"), fingerprint("elegant man"));
        assert_eq!(fingerprint("ELEGANT-MAN"), fingerprint("elegant man"));
        assert_eq!(fingerprint("caf\u{e9} 42"), fingerprint("caf"));
    }

    #[test]
    fn letter_free_input_maps_to_sentinel() {
        assert_eq!(fingerprint("").as_str(), EMPTY_FINGERPRINT);
        assert_eq!(fingerprint("1234 !!").as_str(), EMPTY_FINGERPRINT);
        assert!(fingerprint("...").is_empty_sentinel());
        assert_eq!(letter_count(EMPTY_FINGERPRINT), 0);
    }

    #[test]
    fn counts_are_clamped() {
        let long = "e".repeat(60);
        let longer = "e".repeat(70);
        assert_eq!(fingerprint(&long), fingerprint(&longer));
        assert_eq!(fingerprint(&long).as_str(), "p@");
    }

    #[test]
    fn letter_count_recovers_length() {
        let text = "Saturday morning in bed";
        let fp = fingerprint(text);
        let letters = text.chars().filter(|c| c.is_ascii_alphabetic()).count();
        assert_eq!(fp.letter_count(), letters);
        assert_eq!(letter_count(fp.as_str()), 20);
    }

    #[test]
    fn serializes_as_plain_string() {
        let fp = fingerprint("listen");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, "\"AA@@AAA@@@A@\"");
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }
}
