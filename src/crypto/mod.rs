// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Encryption at rest.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Crypto Module                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  mod.rs          - AEAD primitives and at-rest types         │
//! │  └─ Algorithm: aes-256-gcm | aes-128-gcm | chacha20-poly1305 │
//! │  └─ EncryptionMaterial: one key generation {key, iv, ts}     │
//! │  └─ SealedData: ciphertext + tag + nonce + key index         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  key_manager.rs  - bounded rotation window, fallback decrypt │
//! │  key_file.rs     - JSON side-file with base64 key material   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every seal uses a fresh random 96-bit nonce. The material's 16-byte IV is
//! bound in as associated data, so a ciphertext only authenticates under the
//! exact generation that produced it.

pub mod key_file;
pub mod key_manager;

use std::fmt;
use std::str::FromStr;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum number of retained key generations.
pub const MAX_KEYS: usize = 3;
/// Length of a material's IV.
pub const IV_LEN: usize = 16;
/// Length of the per-seal AEAD nonce.
pub const NONCE_LEN: usize = 12;
/// Length of the AEAD authentication tag.
pub const TAG_LEN: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailure(String),
    /// Every retained material was tried, newest first after the declared one.
    #[error("decryption failed after trying key generations {tried_keys:?}")]
    DecryptionFailure { tried_keys: Vec<usize> },
    #[error("key file error: {0}")]
    KeyFile(String),
}

/// Supported AEAD algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    #[serde(rename = "aes-128-gcm")]
    Aes128Gcm,
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl Algorithm {
    /// Key length in bytes.
    #[must_use]
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes256Gcm | Self::ChaCha20Poly1305 => 32,
            Self::Aes128Gcm => 16,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aes256Gcm => "aes-256-gcm",
            Self::Aes128Gcm => "aes-128-gcm",
            Self::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Self::Aes256Gcm
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aes-256-gcm" => Ok(Self::Aes256Gcm),
            "aes-128-gcm" => Ok(Self::Aes128Gcm),
            "chacha20-poly1305" => Ok(Self::ChaCha20Poly1305),
            other => Err(format!("unrecognized algorithm '{}'", other)),
        }
    }
}

/// One key generation. Never mutated after creation; zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionMaterial {
    key: Vec<u8>,
    iv: Vec<u8>,
    #[zeroize(skip)]
    created_at: i64,
}

impl EncryptionMaterial {
    /// Generate a random key of `key_len` bytes and a random IV.
    #[must_use]
    pub fn generate(key_len: usize) -> Self {
        let mut key = vec![0u8; key_len];
        let mut iv = vec![0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        rand::rngs::OsRng.fill_bytes(&mut iv);
        Self {
            key,
            iv,
            created_at: crate::key::now_millis(),
        }
    }

    #[must_use]
    pub fn from_parts(key: Vec<u8>, iv: Vec<u8>, created_at: i64) -> Self {
        Self { key, iv, created_at }
    }

    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    #[must_use]
    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    #[must_use]
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Short SHA-256 fingerprint of the key, safe to log.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.key);
        hex::encode(&digest[..4])
    }
}

impl fmt::Debug for EncryptionMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionMaterial")
            .field("fingerprint", &self.fingerprint())
            .field("key_len", &self.key.len())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Output of a seal: everything needed to open it again except the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedData {
    /// Index of the sealing material at seal time.
    pub key_id: usize,
    pub algorithm: Algorithm,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub auth_tag: Vec<u8>,
}

/// At-rest form of a cache value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    #[serde(flatten)]
    pub sealed: SealedData,
    /// Declared variant tag, validated on decode.
    pub value_type: String,
    /// Plaintext was zstd-compressed before sealing.
    #[serde(default)]
    pub compressed: bool,
}

impl EncryptedPayload {
    #[must_use]
    pub fn key_id(&self) -> usize {
        self.sealed.key_id
    }

    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.sealed.ciphertext.len()
            + self.sealed.auth_tag.len()
            + self.sealed.nonce.len()
            + self.value_type.len()
    }
}

/// Seal `plaintext` under `material`.
pub(crate) fn seal(
    algorithm: Algorithm,
    material: &EncryptionMaterial,
    key_id: usize,
    plaintext: &[u8],
) -> Result<SealedData, CryptoError> {
    if material.key.len() != algorithm.key_len() {
        return Err(CryptoError::EncryptionFailure(format!(
            "{} requires a {}-byte key, material has {} bytes",
            algorithm,
            algorithm.key_len(),
            material.key.len()
        )));
    }

    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let mut sealed = match algorithm {
        Algorithm::Aes256Gcm => seal_with::<Aes256Gcm>(&material.key, &nonce, &material.iv, plaintext),
        Algorithm::Aes128Gcm => seal_with::<Aes128Gcm>(&material.key, &nonce, &material.iv, plaintext),
        Algorithm::ChaCha20Poly1305 => {
            seal_with::<ChaCha20Poly1305>(&material.key, &nonce, &material.iv, plaintext)
        }
    }?;

    // AEAD output is ciphertext || tag
    let auth_tag = sealed.split_off(sealed.len() - TAG_LEN);
    Ok(SealedData {
        key_id,
        algorithm,
        nonce: nonce.to_vec(),
        ciphertext: sealed,
        auth_tag,
    })
}

/// Open `sealed` with one specific material.
pub(crate) fn open(material: &EncryptionMaterial, sealed: &SealedData) -> Option<Vec<u8>> {
    if sealed.nonce.len() != NONCE_LEN || sealed.auth_tag.len() != TAG_LEN {
        return None;
    }
    if material.key.len() != sealed.algorithm.key_len() {
        return None;
    }

    let mut combined = Vec::with_capacity(sealed.ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(&sealed.ciphertext);
    combined.extend_from_slice(&sealed.auth_tag);

    match sealed.algorithm {
        Algorithm::Aes256Gcm => open_with::<Aes256Gcm>(&material.key, &sealed.nonce, &material.iv, &combined),
        Algorithm::Aes128Gcm => open_with::<Aes128Gcm>(&material.key, &sealed.nonce, &material.iv, &combined),
        Algorithm::ChaCha20Poly1305 => {
            open_with::<ChaCha20Poly1305>(&material.key, &sealed.nonce, &material.iv, &combined)
        }
    }
}

fn seal_with<C>(key: &[u8], nonce: &[u8], aad: &[u8], msg: &[u8]) -> Result<Vec<u8>, CryptoError>
where
    C: Aead + KeyInit,
{
    let cipher = C::new_from_slice(key)
        .map_err(|e| CryptoError::EncryptionFailure(format!("failed to create cipher: {}", e)))?;
    cipher
        .encrypt(GenericArray::from_slice(nonce), Payload { msg, aad })
        .map_err(|e| CryptoError::EncryptionFailure(e.to_string()))
}

fn open_with<C>(key: &[u8], nonce: &[u8], aad: &[u8], msg: &[u8]) -> Option<Vec<u8>>
where
    C: Aead + KeyInit,
{
    let cipher = C::new_from_slice(key).ok()?;
    cipher
        .decrypt(GenericArray::from_slice(nonce), Payload { msg, aad })
        .ok()
}

/// Base64 (standard alphabet) for byte fields.
pub(crate) mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_each_algorithm() {
        for algorithm in [Algorithm::Aes256Gcm, Algorithm::Aes128Gcm, Algorithm::ChaCha20Poly1305] {
            let material = EncryptionMaterial::generate(algorithm.key_len());
            let sealed = seal(algorithm, &material, 0, b"hello").unwrap();

            assert_eq!(sealed.auth_tag.len(), TAG_LEN);
            assert_eq!(sealed.nonce.len(), NONCE_LEN);
            assert_ne!(sealed.ciphertext, b"hello");
            assert_eq!(open(&material, &sealed).unwrap(), b"hello");
        }
    }

    #[test]
    fn test_seal_rejects_key_length_mismatch() {
        let material = EncryptionMaterial::generate(16);
        let err = seal(Algorithm::Aes256Gcm, &material, 0, b"x").unwrap_err();
        assert!(matches!(err, CryptoError::EncryptionFailure(msg) if msg.contains("32-byte")));
    }

    #[test]
    fn test_open_fails_under_other_material() {
        let a = EncryptionMaterial::generate(32);
        let b = EncryptionMaterial::generate(32);
        let sealed = seal(Algorithm::Aes256Gcm, &a, 0, b"secret").unwrap();
        assert!(open(&b, &sealed).is_none());
    }

    #[test]
    fn test_open_fails_when_iv_differs() {
        let a = EncryptionMaterial::generate(32);
        let same_key_other_iv = EncryptionMaterial::from_parts(a.key().to_vec(), vec![7u8; IV_LEN], 0);
        let sealed = seal(Algorithm::Aes256Gcm, &a, 0, b"secret").unwrap();
        assert!(open(&same_key_other_iv, &sealed).is_none());
    }

    #[test]
    fn test_tampered_tag_fails() {
        let material = EncryptionMaterial::generate(32);
        let mut sealed = seal(Algorithm::Aes256Gcm, &material, 0, b"secret").unwrap();
        sealed.auth_tag[0] ^= 0xff;
        assert!(open(&material, &sealed).is_none());
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!("AES-256-GCM".parse::<Algorithm>().unwrap(), Algorithm::Aes256Gcm);
        assert_eq!("chacha20-poly1305".parse::<Algorithm>().unwrap(), Algorithm::ChaCha20Poly1305);
        assert!("des".parse::<Algorithm>().is_err());
        assert_eq!(Algorithm::Aes128Gcm.to_string(), "aes-128-gcm");
    }

    #[test]
    fn test_debug_redacts_key() {
        let material = EncryptionMaterial::from_parts(vec![0xab; 32], vec![0; IV_LEN], 1);
        let debug = format!("{:?}", material);
        assert!(!debug.contains("[171"));
        assert!(debug.contains("fingerprint"));
    }

    #[test]
    fn test_payload_serializes_bytes_as_base64() {
        let payload = EncryptedPayload {
            sealed: SealedData {
                key_id: 1,
                algorithm: Algorithm::Aes256Gcm,
                nonce: vec![0; NONCE_LEN],
                ciphertext: vec![1, 2, 3],
                auth_tag: vec![0; TAG_LEN],
            },
            value_type: "string".into(),
            compressed: false,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["ciphertext"], "AQID");
        assert_eq!(json["keyId"], 1);
        assert_eq!(json["algorithm"], "aes-256-gcm");

        let back: EncryptedPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }
}
