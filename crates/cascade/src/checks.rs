//! The individual cascade stages.
//!
//! Each check returns `true` when the pair *passes* (looks like an
//! interesting anagram so far) and `false` when it should be rejected.
//! Degenerate input (no letters, no words) is always rejected.

use canonical::{stripped, stripped_spaced, words};

/// Fraction of aligned letter positions that are identical.
///
/// Rejects pairs of different stripped length outright, and pairs where
/// `cutoff` or more of the positions match. Identical texts always fail.
pub fn char_diff(one: &str, two: &str, cutoff: f64) -> bool {
    let one = stripped(one);
    let two = stripped(two);
    if one.len() != two.len() || one.is_empty() {
        return false;
    }
    let same = one
        .bytes()
        .zip(two.bytes())
        .filter(|(a, b)| a == b)
        .count();
    (same as f64 / one.len() as f64) < cutoff
}

/// Share of the shorter word list that also occurs in the other list.
///
/// Words are matched as a multiset, so a repeated word only counts as shared
/// as often as it appears on both sides. The measure is symmetric.
pub fn word_diff(one: &str, two: &str, cutoff: f64) -> bool {
    let words_one = words(one);
    let mut remaining = words(two);
    let shorter = words_one.len().min(remaining.len());
    if shorter == 0 {
        return false;
    }
    let mut same = 0usize;
    for word in &words_one {
        if let Some(pos) = remaining.iter().position(|w| w == word) {
            remaining.swap_remove(pos);
            same += 1;
        }
    }
    (same as f64 / shorter as f64) < cutoff
}

/// Detects words that were run together without spaces ("cat dog" vs
/// "catdog").
///
/// Equal word counts pass untouched. Otherwise every word of the longer list
/// is removed once from the joined shorter list; the pair passes when more
/// than `cutoff` of the longer list's letters are left over.
pub fn combined_words(one: &str, two: &str, cutoff: f64) -> bool {
    let words_one = words(one);
    let words_two = words(two);
    if words_one.len() == words_two.len() {
        return true;
    }
    let (more, fewer) = if words_one.len() > words_two.len() {
        (words_one, words_two)
    } else {
        (words_two, words_one)
    };

    let mut rest = fewer.join(" ");
    for word in &more {
        remove_first(&mut rest, word);
    }

    let more_letters: usize = more.iter().map(String::len).sum();
    if more_letters == 0 {
        return false;
    }
    (letters_in(&rest) as f64 / more_letters as f64) > cutoff
}

/// Greedy word removal, checked in both directions.
pub fn greedy_removal(one: &str, two: &str, cutoff: f64) -> bool {
    greedy_removal_one_way(one, two, cutoff) && greedy_removal_one_way(two, one, cutoff)
}

/// Remove `one`'s words (longest first, three letters or more) from `two`,
/// once each, and require at least `cutoff` of `one`'s letters worth of
/// `two` to remain.
pub fn greedy_removal_one_way(one: &str, two: &str, cutoff: f64) -> bool {
    let mut words_one = words(one);
    words_one.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut rest = stripped_spaced(two);
    for word in words_one.iter().filter(|w| w.len() > 2) {
        remove_first(&mut rest, word);
    }

    let total: usize = words_one.iter().map(String::len).sum();
    if total == 0 {
        return false;
    }
    (letters_in(&rest) as f64 / total as f64) >= cutoff
}

fn remove_first(haystack: &mut String, needle: &str) {
    if let Some(pos) = haystack.find(needle) {
        haystack.replace_range(pos..pos + needle.len(), "");
    }
}

fn letters_in(text: &str) -> usize {
    text.bytes().filter(|b| *b != b' ').count()
}
