// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entry codec: [`DataValue`] ⇄ [`EncryptedPayload`].
//!
//! Pure composition over the [`KeyManager`]: canonical bytes of the value
//! (optionally compressed) are sealed with the newest key, and the variant
//! tag is carried next to the ciphertext. Decoding validates the tag before
//! any decryption happens and checks the plaintext actually parses as that
//! variant.

use std::sync::Arc;
use thiserror::Error;

use crate::compression::{self, CompressionError};
use crate::crypto::key_manager::KeyManager;
use crate::crypto::{Algorithm, CryptoError, EncryptedPayload};
use crate::value::{DataValue, UnknownValueType, ValueType};

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to serialize {value_type} value: {source}")]
    Serialize {
        value_type: ValueType,
        source: serde_json::Error,
    },
    #[error(transparent)]
    UnknownValueType(#[from] UnknownValueType),
    #[error("payload does not match declared type {declared}: {reason}")]
    TypeMismatch { declared: ValueType, reason: String },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Compression(#[from] CompressionError),
}

/// A sealed value plus its absolute expiration (epoch millis).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEntry {
    pub payload: EncryptedPayload,
    pub expires_at: i64,
}

#[derive(Clone)]
pub struct EntryCodec {
    keys: Arc<KeyManager>,
    algorithm: Algorithm,
    /// zstd level when compression is on
    compression_level: Option<i32>,
}

impl EntryCodec {
    pub fn new(keys: Arc<KeyManager>, algorithm: Algorithm) -> Self {
        Self {
            keys,
            algorithm,
            compression_level: None,
        }
    }

    /// Compress plaintext at `level` before sealing.
    #[must_use]
    pub fn with_compression(mut self, level: i32) -> Self {
        self.compression_level = Some(level);
        self
    }

    #[must_use]
    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    pub async fn encode_entry(&self, value: &DataValue, expires_at: i64) -> Result<SealedEntry, CodecError> {
        let value_type = value.value_type();
        let mut plaintext = value
            .to_canonical_bytes()
            .map_err(|source| CodecError::Serialize { value_type, source })?;

        let compressed = match self.compression_level {
            Some(level) => {
                plaintext = compression::compress_bytes(&plaintext, level)?;
                true
            }
            None => false,
        };

        let sealed = self.keys.encrypt(&plaintext, self.algorithm).await?;
        Ok(SealedEntry {
            payload: EncryptedPayload {
                sealed,
                value_type: value_type.as_str().to_string(),
                compressed,
            },
            expires_at,
        })
    }

    pub async fn decode_entry(&self, payload: &EncryptedPayload) -> Result<DataValue, CodecError> {
        let declared: ValueType = payload.value_type.parse()?;

        let mut plaintext = self.keys.decrypt(&payload.sealed).await?;
        if payload.compressed {
            plaintext = compression::decompress_bytes(&plaintext)?;
        }

        DataValue::from_canonical_bytes(declared, &plaintext).map_err(|e| CodecError::TypeMismatch {
            declared,
            reason: e.to_string(),
        })
    }
}
