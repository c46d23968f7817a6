use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::debug;

/// Compression algorithm selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// No compression
    None,
    /// LZ4 - Fast compression/decompression (default)
    #[default]
    Lz4,
    /// Zstandard - Better compression ratio
    Zstd,
}

impl CompressionAlgorithm {
    /// Tag stored in the frame header
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Lz4 => 1,
            Self::Zstd => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::None),
            1 => Some(Self::Lz4),
            2 => Some(Self::Zstd),
            _ => None,
        }
    }
}

/// Compression configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Enable compression globally
    pub enabled: bool,
    /// Minimum payload size to compress (bytes)
    pub threshold_bytes: usize,
    /// Algorithm applied to payloads above the threshold
    pub algorithm: CompressionAlgorithm,
    /// Zstd compression level (1-22)
    pub zstd_level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_bytes: 1024, // Don't compress < 1KB
            algorithm: CompressionAlgorithm::Lz4,
            zstd_level: 3,
        }
    }
}

/// Payload compressor applied after encoding
#[derive(Debug, Clone)]
pub struct Compressor {
    config: CompressionConfig,
}

impl Compressor {
    /// Create new compressor with configuration
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    /// Compress `data` if it is eligible and compression actually shrinks it.
    ///
    /// Returns the bytes to store and the algorithm that produced them.
    pub fn compress(&self, data: &[u8]) -> Result<(Vec<u8>, CompressionAlgorithm), std::io::Error> {
        if !self.should_compress(data) {
            debug!("Skipping compression: size={} bytes", data.len());
            return Ok((data.to_vec(), CompressionAlgorithm::None));
        }

        let compressed = match self.config.algorithm {
            CompressionAlgorithm::None => return Ok((data.to_vec(), CompressionAlgorithm::None)),
            CompressionAlgorithm::Lz4 => self.compress_lz4(data)?,
            CompressionAlgorithm::Zstd => self.compress_zstd(data)?,
        };

        if compressed.len() >= data.len() {
            debug!(
                "Compression did not shrink payload ({} → {} bytes), storing raw",
                data.len(),
                compressed.len()
            );
            return Ok((data.to_vec(), CompressionAlgorithm::None));
        }

        Ok((compressed, self.config.algorithm))
    }

    /// Decompress data produced by `algorithm`
    pub fn decompress(
        &self,
        data: &[u8],
        algorithm: CompressionAlgorithm,
    ) -> Result<Vec<u8>, std::io::Error> {
        match algorithm {
            CompressionAlgorithm::None => Ok(data.to_vec()),
            CompressionAlgorithm::Lz4 => self.decompress_lz4(data),
            CompressionAlgorithm::Zstd => self.decompress_zstd(data),
        }
    }

    fn compress_lz4(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        let mut encoder = lz4::EncoderBuilder::new()
            .level(4) // Fast compression
            .build(Vec::new())?;

        encoder.write_all(data)?;
        let (compressed, result) = encoder.finish();
        result?;

        debug!(
            "LZ4 compressed: {} → {} bytes (ratio: {:.2}x)",
            data.len(),
            compressed.len(),
            compression_ratio(data.len(), compressed.len())
        );

        Ok(compressed)
    }

    fn decompress_lz4(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        let mut decoder = lz4::Decoder::new(data)?;
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(decompressed)
    }

    fn compress_zstd(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        let compressed = zstd::encode_all(data, self.config.zstd_level)?;

        debug!(
            "Zstd compressed: {} → {} bytes (ratio: {:.2}x)",
            data.len(),
            compressed.len(),
            compression_ratio(data.len(), compressed.len())
        );

        Ok(compressed)
    }

    fn decompress_zstd(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        zstd::decode_all(data)
    }

    /// Whether a payload of this size is eligible for compression
    pub fn should_compress(&self, data: &[u8]) -> bool {
        self.config.enabled
            && self.config.algorithm != CompressionAlgorithm::None
            && data.len() >= self.config.threshold_bytes
    }
}

fn compression_ratio(original: usize, compressed: usize) -> f64 {
    if compressed == 0 {
        return 1.0;
    }
    original as f64 / compressed as f64
}
