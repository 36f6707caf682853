use thiserror::Error;

/// Errors raised by the canonical layer itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CanonicalError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Reason an inbound message was not admitted as a candidate.
///
/// Rejections are expected on most of a live stream; callers typically count
/// them and move on.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterRejection {
    #[error("language {found:?} is not {expected}")]
    Language {
        expected: String,
        found: Option<String>,
    },
    #[error("message mentions another user")]
    Mention,
    #[error("message is a retweet")]
    Retweet,
    #[error("message contains a link")]
    Url,
    #[error("message contains digits")]
    Digits,
    #[error("too few letters ({letters}, need more than {cutoff})")]
    TooShort { letters: usize, cutoff: usize },
    #[error("too few distinct letters ({unique}, need more than {cutoff})")]
    TooFewUniqueLetters { unique: usize, cutoff: usize },
    #[error("too many unusual characters (ratio {ratio:.2} < {cutoff:.2})")]
    LowNiceRatio { ratio: f64, cutoff: f64 },
}

impl FilterRejection {
    /// Short stable label, suitable for a metrics dimension.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Language { .. } => "language",
            Self::Mention => "mention",
            Self::Retweet => "retweet",
            Self::Url => "url",
            Self::Digits => "digits",
            Self::TooShort { .. } => "too_short",
            Self::TooFewUniqueLetters { .. } => "few_unique",
            Self::LowNiceRatio { .. } => "nice_ratio",
        }
    }
}
