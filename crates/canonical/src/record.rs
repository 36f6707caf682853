//! Message and candidate record types.

use serde::{Deserialize, Serialize};

use crate::fingerprint::{fingerprint, Fingerprint};

/// A raw message as delivered by the stream source, before filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: u64,
    pub text: String,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub is_retweet: bool,
}

impl InboundMessage {
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            lang: None,
            is_retweet: false,
        }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn retweet(mut self) -> Self {
        self.is_retweet = true;
        self
    }
}

/// One normalized message that is eligible for matching.
///
/// The fingerprint is derived from the text on construction and cannot be set
/// independently. Serialized form carries only `id` and `text`; the
/// fingerprint is recomputed on decode so stored data can never disagree with
/// the current fingerprint function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredRecord", into = "StoredRecord")]
pub struct CandidateRecord {
    id: u64,
    text: String,
    fingerprint: Fingerprint,
}

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    id: u64,
    text: String,
}

impl From<StoredRecord> for CandidateRecord {
    fn from(stored: StoredRecord) -> Self {
        CandidateRecord::new(stored.id, stored.text)
    }
}

impl From<CandidateRecord> for StoredRecord {
    fn from(record: CandidateRecord) -> Self {
        StoredRecord {
            id: record.id,
            text: record.text,
        }
    }
}

impl CandidateRecord {
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        let text = text.into();
        let fingerprint = fingerprint(&text);
        Self {
            id,
            text,
            fingerprint,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn into_parts(self) -> (u64, String, Fingerprint) {
        (self.id, self.text, self.fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_follows_text() {
        let record = CandidateRecord::new(7, "Listen!");
        assert_eq!(record.id(), 7);
        assert_eq!(record.text(), "Listen!");
        assert_eq!(record.fingerprint(), &fingerprint("silent"));
    }

    #[test]
    fn serialized_form_omits_fingerprint() {
        let record = CandidateRecord::new(1, "listen");
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"id":1,"text":"listen"}"#);
        let back: CandidateRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn inbound_defaults_are_optional() {
        let msg: InboundMessage = serde_json::from_str(r#"{"id":3,"text":"hi"}"#).unwrap();
        assert_eq!(msg, InboundMessage::new(3, "hi"));
    }
}
