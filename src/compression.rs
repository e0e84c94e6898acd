// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Optional plaintext compression before sealing.
//!
//! Uses zstd behind the `compression` feature:
//!
//! ```toml
//! [dependencies]
//! sealed-cache = { version = "0.1", features = ["compression"] }
//! ```
//!
//! Compression must happen before encryption; ciphertext does not compress.
//! Payloads record whether they were compressed, so entries written with
//! compression on stay readable after it is switched off (as long as the
//! feature is compiled in).

/// Zstd magic bytes (little-endian): 0xFD2FB528
#[cfg(feature = "compression")]
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Highest level zstd accepts.
pub const MAX_COMPRESSION_LEVEL: i32 = 22;

#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("compression failed: {0}")]
    CompressFailed(String),

    #[error("decompression failed: {0}")]
    DecompressFailed(String),

    /// Payload is compressed but this build has no codec for it.
    #[error("compression support not compiled in (enable the `compression` feature)")]
    Unavailable,
}

/// Whether this build can compress.
#[must_use]
pub const fn is_available() -> bool {
    cfg!(feature = "compression")
}

/// Check if data is zstd-compressed by checking magic bytes.
#[cfg(feature = "compression")]
#[inline]
#[must_use]
pub fn is_compressed(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == ZSTD_MAGIC
}

/// Compress bytes at `level` (1-22).
#[cfg(feature = "compression")]
pub fn compress_bytes(data: &[u8], level: i32) -> Result<Vec<u8>, CompressionError> {
    zstd::encode_all(data, level).map_err(|e| CompressionError::CompressFailed(e.to_string()))
}

/// Decompress bytes. Data without the zstd header is rejected.
#[cfg(feature = "compression")]
pub fn decompress_bytes(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    if !is_compressed(data) {
        return Err(CompressionError::DecompressFailed("missing zstd header".into()));
    }
    zstd::decode_all(data).map_err(|e| CompressionError::DecompressFailed(e.to_string()))
}

// ============================================================================
// Stub implementations when compression feature is disabled
// ============================================================================

#[cfg(not(feature = "compression"))]
#[inline]
#[must_use]
pub fn is_compressed(_data: &[u8]) -> bool {
    false
}

#[cfg(not(feature = "compression"))]
pub fn compress_bytes(_data: &[u8], _level: i32) -> Result<Vec<u8>, CompressionError> {
    Err(CompressionError::Unavailable)
}

#[cfg(not(feature = "compression"))]
pub fn decompress_bytes(_data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    Err(CompressionError::Unavailable)
}
