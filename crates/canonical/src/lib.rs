//! Canonical text layer for anagram matching.
//!
//! Turns raw stream messages into [`CandidateRecord`]s that the matcher can
//! index by [`Fingerprint`].
//!
//! ## What we do
//!
//! - Upstream pre-filter ([`prefilter`]): language, mention, retweet, link,
//!   digit, length and character-quality checks
//! - Text normalization: HTML entity decoding and accent stripping
//! - Letter-multiset fingerprints ([`fingerprint`]) plus the inverse
//!   [`letter_count`] used by store maintenance
//!
//! ## Pure function guarantee
//!
//! No I/O, no clock calls, no locale dependence. The same text always yields
//! the same fingerprint on any machine.

mod config;
mod error;
mod filter;
mod fingerprint;
mod normalize;
mod record;

pub use crate::config::FilterConfig;
pub use crate::error::{CanonicalError, FilterRejection};
pub use crate::filter::{nice_ratio, prefilter};
pub use crate::fingerprint::{
    fingerprint, letter_count, Fingerprint, EMPTY_FINGERPRINT, LETTERS_BY_FREQUENCY,
    MAX_SLOT_COUNT, SLOT_BASE,
};
pub use crate::normalize::{
    contains_accented_latin, correct_encodings, normalize_text, strip_accents, stripped,
    stripped_spaced, unique_letters, words,
};
pub use crate::record::{CandidateRecord, InboundMessage};
