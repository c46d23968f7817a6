//! Value Serializer
//!
//! Converts values to the bytes stored in every layer. Frame layout:
//!
//! ```text
//! [header: codec << 4 | compression][payload]
//! ```
//!
//! The codec is fixed when the serializer is built; a payload written by a
//! different codec is reported as a serialization error rather than decoded
//! into garbage.

pub mod compressor;

pub use compressor::{CompressionAlgorithm, CompressionConfig, Compressor};

use crate::core::error::{CacheError, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Encoding used for cached values
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// serde_json; readable from other languages sharing the remote stores
    #[default]
    Json,
    /// bincode; compact, Rust-only
    Binary,
}

impl Codec {
    fn tag(self) -> u8 {
        match self {
            Self::Json => 1,
            Self::Binary => 2,
        }
    }
}

/// Encodes values once per write and decodes them on read
#[derive(Debug, Clone)]
pub struct Serializer {
    codec: Codec,
    compressor: Compressor,
}

impl Serializer {
    pub fn new(codec: Codec, compression: CompressionConfig) -> Self {
        Self {
            codec,
            compressor: Compressor::new(compression),
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Encode a value into a framed, possibly compressed, payload
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let raw = match self.codec {
            Codec::Json => serde_json::to_vec(value)
                .map_err(|e| CacheError::Serialization(e.to_string()))?,
            Codec::Binary => bincode::serde::encode_to_vec(value, bincode::config::standard())
                .map_err(|e| CacheError::Serialization(e.to_string()))?,
        };

        let (payload, algorithm) = self
            .compressor
            .compress(&raw)
            .map_err(|e| CacheError::Serialization(format!("compression failed: {}", e)))?;

        let mut framed = Vec::with_capacity(payload.len() + 1);
        framed.push((self.codec.tag() << 4) | algorithm.tag());
        framed.extend_from_slice(&payload);
        Ok(framed)
    }

    /// Decode a framed payload back into a value
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        let (&header, payload) = bytes
            .split_first()
            .ok_or_else(|| CacheError::Serialization("empty payload".to_string()))?;

        let codec_tag = header >> 4;
        if codec_tag != self.codec.tag() {
            return Err(CacheError::Serialization(format!(
                "payload codec tag {} does not match configured {:?}",
                codec_tag, self.codec
            )));
        }

        let algorithm = CompressionAlgorithm::from_tag(header & 0x0f).ok_or_else(|| {
            CacheError::Serialization(format!("unknown compression tag {}", header & 0x0f))
        })?;

        let raw = self
            .compressor
            .decompress(payload, algorithm)
            .map_err(|e| CacheError::Serialization(format!("decompression failed: {}", e)))?;

        match self.codec {
            Codec::Json => {
                serde_json::from_slice(&raw).map_err(|e| CacheError::Serialization(e.to_string()))
            }
            Codec::Binary => {
                bincode::serde::decode_from_slice(&raw, bincode::config::standard())
                    .map(|(value, _)| value)
                    .map_err(|e| CacheError::Serialization(e.to_string()))
            }
        }
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new(Codec::default(), CompressionConfig::default())
    }
}
