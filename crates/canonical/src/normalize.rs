//! Text normalization helpers shared by the fingerprint, the pre-filter and
//! the similarity cascade.
//!
//! Everything here is a pure function of its input. The "stripped" forms
//! keep ASCII letters only, so they agree byte-for-byte with what
//! [`fingerprint`](crate::fingerprint) counts.

use std::borrow::Cow;

use unicode_categories::UnicodeCategories;
use unicode_normalization::UnicodeNormalization;

/// Lowercase ASCII letters of `text`, everything else removed.
///
/// ```rust
/// use canonical::stripped;
///
/// assert_eq!(stripped("It's 5 o'clock!"), "itsoclock");
/// ```
pub fn stripped(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Lowercase ASCII letters and word separators of `text`.
///
/// Hyphens, underscores and any whitespace become a single ASCII space each;
/// all other characters are removed (so "don't" becomes "dont").
pub fn stripped_spaced(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphabetic() {
            out.push(c.to_ascii_lowercase());
        } else if c == '-' || c == '_' || c.is_whitespace() {
            out.push(' ');
        }
    }
    out
}

/// Words of `text` after [`stripped_spaced`].
pub fn words(text: &str) -> Vec<String> {
    stripped_spaced(text)
        .split_whitespace()
        .map(str::to_owned)
        .collect()
}

/// Number of distinct letters in `text` (case-insensitive).
pub fn unique_letters(text: &str) -> usize {
    let mut seen = [false; 26];
    for b in text.bytes().filter(u8::is_ascii_alphabetic) {
        seen[(b.to_ascii_lowercase() - b'a') as usize] = true;
    }
    seen.iter().filter(|&&s| s).count()
}

/// Undo the HTML escaping applied by the source platform to `&`, `<` and `>`.
///
/// `&amp;` is decoded first, matching the platform's single escaping pass.
pub fn correct_encodings(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">"),
    )
}

/// True if `text` contains Latin-1 supplement or Latin Extended-A/B characters.
pub fn contains_accented_latin(text: &str) -> bool {
    text.chars().any(|c| ('\u{0080}'..='\u{024F}').contains(&c))
}

/// Decompose to NFD and drop non-spacing marks, leaving base letters.
///
/// ```rust
/// use canonical::strip_accents;
///
/// assert_eq!(strip_accents("Café crème"), "Cafe creme");
/// ```
pub fn strip_accents(text: &str) -> String {
    text.nfd().filter(|c| !c.is_mark_nonspacing()).collect()
}

/// Normalize message text before fingerprinting: decode entities, then strip
/// accents if the text is not plain ASCII and contains accented Latin letters.
pub fn normalize_text(text: &str) -> String {
    let decoded = correct_encodings(text);
    if !decoded.is_ascii() && contains_accented_latin(&decoded) {
        strip_accents(&decoded)
    } else {
        decoded.into_owned()
    }
}
