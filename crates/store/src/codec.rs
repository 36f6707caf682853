//! Record encoding for overflow segments.
//!
//! Records are bincode-encoded (serde mode, standard config) and optionally
//! zstd-compressed. Candidate texts are short, so compression is off by
//! default.

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use canonical::{CandidateRecord, Fingerprint};
use serde::{Deserialize, Serialize};
use zstd::{decode_all, encode_all};

use crate::StoreError;

/// Compression codec options for stored records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionCodec {
    #[default]
    None,
    Zstd,
}

/// Compression behavior configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub codec: CompressionCodec,
    /// Zstd level (1-22). Ignored for [`CompressionCodec::None`].
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn new(codec: CompressionCodec, level: i32) -> Self {
        Self { codec, level }
    }

    pub fn zstd() -> Self {
        Self::new(CompressionCodec::Zstd, 3)
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    fn compress(&self, data: Vec<u8>) -> Result<Vec<u8>, StoreError> {
        match self.codec {
            CompressionCodec::None => Ok(data),
            CompressionCodec::Zstd => encode_all(data.as_slice(), self.level)
                .map_err(|e| StoreError::Compression(e.to_string())),
        }
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<std::borrow::Cow<'a, [u8]>, StoreError> {
        match self.codec {
            CompressionCodec::None => Ok(std::borrow::Cow::Borrowed(data)),
            CompressionCodec::Zstd => decode_all(data)
                .map(std::borrow::Cow::Owned)
                .map_err(|e| StoreError::Decode(e.to_string())),
        }
    }
}

/// Encodes and decodes [`CandidateRecord`]s for segment storage.
#[derive(Clone, Debug, Default)]
pub struct RecordCodec {
    compression: CompressionConfig,
}

impl RecordCodec {
    pub fn new(compression: CompressionConfig) -> Self {
        Self { compression }
    }

    pub fn encode(&self, record: &CandidateRecord) -> Result<Vec<u8>, StoreError> {
        let encoded = encode_to_vec(record, standard())?;
        self.compression.compress(encoded)
    }

    pub fn decode(&self, data: &[u8]) -> Result<CandidateRecord, StoreError> {
        let raw = self.compression.decompress(data)?;
        let (record, _) = decode_from_slice(&raw, standard())?;
        Ok(record)
    }

    /// Decode and check that the record still belongs under `key`.
    pub fn decode_for(&self, key: &Fingerprint, data: &[u8]) -> Result<CandidateRecord, StoreError> {
        let record = self.decode(data)?;
        if record.fingerprint() != key {
            return Err(StoreError::Decode(format!(
                "record {} stored under {key} fingerprints as {}",
                record.id(),
                record.fingerprint()
            )));
        }
        Ok(record)
    }
}
