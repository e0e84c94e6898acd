// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Rotating key manager.
//!
//! Owns a bounded, ordered list of [`EncryptionMaterial`] (newest last, at
//! most `max_keys`). New payloads are always sealed with the newest
//! material. Opening tries the payload's declared `key_id` first, then every
//! retained material from newest to oldest.
//!
//! Rotation appends a generation and drops the oldest once the bound is
//! exceeded. Payloads sealed under a dropped generation can no longer be
//! opened; callers that want fresh-key coverage rewrite their entries.
//!
//! # Example
//!
//! ```
//! use sealed_cache::crypto::key_manager::{KeyManager, KeyManagerConfig};
//! use sealed_cache::crypto::Algorithm;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let keys = KeyManager::new(KeyManagerConfig::default());
//! let sealed = keys.encrypt(b"hello", Algorithm::Aes256Gcm).await.unwrap();
//! assert_eq!(keys.decrypt(&sealed).await.unwrap(), b"hello");
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::key_file::KeyFile;
use super::{open, seal, Algorithm, CryptoError, EncryptionMaterial, SealedData, MAX_KEYS};

#[derive(Debug, Clone)]
pub struct KeyManagerConfig {
    pub algorithm: Algorithm,
    /// Key length in bytes for generated materials
    pub key_size: usize,
    /// Retained generations (defaults to [`MAX_KEYS`])
    pub max_keys: usize,
    /// Minimum time between two rotations
    pub min_rotation_gap: Duration,
    /// Durable side-file; `None` keeps materials in memory only
    pub key_file: Option<KeyFile>,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Aes256Gcm,
            key_size: Algorithm::Aes256Gcm.key_len(),
            max_keys: MAX_KEYS,
            min_rotation_gap: Duration::from_secs(60),
            key_file: None,
        }
    }
}

/// Clears the rotation flag however `rotate` exits.
struct RotationGuard<'a>(&'a AtomicBool);

impl Drop for RotationGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct KeyManager {
    config: KeyManagerConfig,
    materials: RwLock<Vec<EncryptionMaterial>>,
    /// Serializes lazy initialization (load-or-generate)
    init_lock: tokio::sync::Mutex<()>,
    rotating: AtomicBool,
    last_rotation: Mutex<Option<Instant>>,
}

impl KeyManager {
    #[must_use]
    pub fn new(config: KeyManagerConfig) -> Self {
        Self {
            config,
            materials: RwLock::new(Vec::new()),
            init_lock: tokio::sync::Mutex::new(()),
            rotating: AtomicBool::new(false),
            last_rotation: Mutex::new(None),
        }
    }

    /// Create and best-effort load materials from the side-file.
    ///
    /// An unreadable side-file is moved aside and a fresh material generated
    /// in its place. Any other failure is logged and swallowed; materials are
    /// then loaded or generated on first use.
    pub async fn open(config: KeyManagerConfig) -> Self {
        let manager = Self::new(config);
        if let Err(e) = manager.ensure_materials().await {
            warn!(error = %e, "Could not load key material at startup, will retry on first use");
        }
        manager
    }

    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.config.algorithm
    }

    /// Number of retained generations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.materials.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.materials.read().is_empty()
    }

    /// Fingerprints of retained materials, oldest first.
    #[must_use]
    pub fn fingerprints(&self) -> Vec<String> {
        self.materials.read().iter().map(EncryptionMaterial::fingerprint).collect()
    }

    /// Newest material, loading from the side-file or generating one first
    /// if none is held.
    pub async fn get_or_create_material(&self) -> Result<EncryptionMaterial, CryptoError> {
        self.newest().await.map(|(_, material)| material)
    }

    /// Seal `plaintext` with the newest material.
    pub async fn encrypt(&self, plaintext: &[u8], algorithm: Algorithm) -> Result<SealedData, CryptoError> {
        let (key_id, material) = self.newest().await?;
        seal(algorithm, &material, key_id, plaintext)
    }

    /// Open `sealed`, falling back across the whole rotation window.
    pub async fn decrypt(&self, sealed: &SealedData) -> Result<Vec<u8>, CryptoError> {
        self.ensure_materials().await?;

        let materials = self.materials.read();
        let declared = (sealed.key_id < materials.len()).then_some(sealed.key_id);
        let candidates: Vec<usize> = declared
            .into_iter()
            .chain((0..materials.len()).rev().filter(|idx| Some(*idx) != declared))
            .collect();

        let mut tried_keys = Vec::with_capacity(candidates.len());
        for idx in candidates {
            tried_keys.push(idx);
            if let Some(plaintext) = open(&materials[idx], sealed) {
                if Some(idx) != declared {
                    debug!(declared = sealed.key_id, opened_with = idx, "Decrypted with fallback key");
                    crate::metrics::record_decrypt_fallback();
                }
                return Ok(plaintext);
            }
        }

        crate::metrics::record_decrypt_failure();
        Err(CryptoError::DecryptionFailure { tried_keys })
    }

    /// Append a new generation, dropping the oldest beyond `max_keys`.
    ///
    /// Returns `Ok(false)` without doing anything if a rotation is already in
    /// flight or the minimum gap since the last rotation has not elapsed.
    #[tracing::instrument(skip(self))]
    pub async fn rotate(&self) -> Result<bool, CryptoError> {
        if self
            .rotating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Rotation already in flight");
            return Ok(false);
        }
        let _guard = RotationGuard(&self.rotating);

        let last_rotation = *self.last_rotation.lock();
        if let Some(last) = last_rotation {
            if last.elapsed() < self.config.min_rotation_gap {
                debug!(elapsed = ?last.elapsed(), "Rotation skipped, minimum gap not elapsed");
                return Ok(false);
            }
        }

        self.ensure_materials().await?;

        let fresh = EncryptionMaterial::generate(self.config.key_size);
        let fingerprint = fresh.fingerprint();
        let mut next = self.materials.read().clone();
        next.push(fresh);
        let dropped = next.len().saturating_sub(self.config.max_keys);
        next.drain(..dropped);

        if let Some(ref file) = self.config.key_file {
            file.save(&next).await?;
        }

        *self.materials.write() = next;
        *self.last_rotation.lock() = Some(Instant::now());

        crate::metrics::record_key_rotation();
        info!(fingerprint = %fingerprint, dropped, retained = self.len(), "Encryption key rotated");
        Ok(true)
    }

    async fn newest(&self) -> Result<(usize, EncryptionMaterial), CryptoError> {
        self.ensure_materials().await?;
        let materials = self.materials.read();
        materials
            .last()
            .map(|m| (materials.len() - 1, m.clone()))
            .ok_or_else(|| CryptoError::EncryptionFailure("no key material available".into()))
    }

    async fn ensure_materials(&self) -> Result<(), CryptoError> {
        if !self.materials.read().is_empty() {
            return Ok(());
        }

        let _init = self.init_lock.lock().await;
        if !self.materials.read().is_empty() {
            return Ok(());
        }

        if let Some(ref file) = self.config.key_file {
            match file.load().await {
                Ok(mut loaded) if !loaded.is_empty() => {
                    let excess = loaded.len().saturating_sub(self.config.max_keys);
                    loaded.drain(..excess);
                    info!(count = loaded.len(), path = %file.path().display(), "Key material loaded");
                    *self.materials.write() = loaded;
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Key file unreadable, regenerating key material");
                    match file.quarantine().await {
                        Ok(moved) => warn!(path = %moved.display(), "Unreadable key file moved aside"),
                        Err(e) => warn!(error = %e, "Could not move unreadable key file aside"),
                    }
                }
            }
        }

        let material = EncryptionMaterial::generate(self.config.key_size);
        if let Some(ref file) = self.config.key_file {
            file.save(std::slice::from_ref(&material)).await?;
        }
        info!(fingerprint = %material.fingerprint(), "Generated initial encryption key");
        self.materials.write().push(material);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn fast_config() -> KeyManagerConfig {
        KeyManagerConfig {
            min_rotation_gap: Duration::from_millis(1),
            ..Default::default()
        }
    }

    async fn rotate_now(keys: &KeyManager) {
        tokio::time::sleep(Duration::from_millis(3)).await;
        assert!(keys.rotate().await.unwrap());
    }

    #[tokio::test]
    async fn test_first_use_generates_one_material() {
        let keys = KeyManager::new(fast_config());
        assert!(keys.is_empty());

        let material = keys.get_or_create_material().await.unwrap();
        assert_eq!(material.key().len(), 32);
        assert_eq!(material.iv().len(), 16);
        assert_eq!(keys.len(), 1);

        // Stable on subsequent calls
        let again = keys.get_or_create_material().await.unwrap();
        assert_eq!(again.key(), material.key());
    }

    #[tokio::test]
    async fn test_encrypt_uses_newest_key_id() {
        let keys = KeyManager::new(fast_config());
        let sealed = keys.encrypt(b"a", Algorithm::Aes256Gcm).await.unwrap();
        assert_eq!(sealed.key_id, 0);

        rotate_now(&keys).await;
        let sealed = keys.encrypt(b"a", Algorithm::Aes256Gcm).await.unwrap();
        assert_eq!(sealed.key_id, 1);
    }

    #[tokio::test]
    async fn test_encrypt_rejects_algorithm_key_mismatch() {
        let keys = KeyManager::new(fast_config());
        let err = keys.encrypt(b"a", Algorithm::Aes128Gcm).await.unwrap_err();
        assert!(matches!(err, CryptoError::EncryptionFailure(_)));
    }

    #[tokio::test]
    async fn test_decrypt_survives_rotation_window() {
        let keys = KeyManager::new(fast_config());
        let sealed = keys.encrypt(b"payload", Algorithm::Aes256Gcm).await.unwrap();

        for _ in 0..(MAX_KEYS - 1) {
            rotate_now(&keys).await;
            assert_eq!(keys.decrypt(&sealed).await.unwrap(), b"payload");
        }
        assert_eq!(keys.len(), MAX_KEYS);

        // One more evicts the sealing generation
        rotate_now(&keys).await;
        let err = keys.decrypt(&sealed).await.unwrap_err();
        assert_eq!(err, CryptoError::DecryptionFailure { tried_keys: vec![0, 2, 1] });
    }

    #[tokio::test]
    async fn test_stale_key_id_falls_back() {
        let keys = KeyManager::new(fast_config());
        rotate_now(&keys).await;
        rotate_now(&keys).await;

        // Sealed with the newest of [A, B, C] -> key_id 2
        let sealed = keys.encrypt(b"x", Algorithm::Aes256Gcm).await.unwrap();
        assert_eq!(sealed.key_id, 2);

        // [B, C, D]: index 2 now names D, payload still opens under C
        rotate_now(&keys).await;
        assert_eq!(keys.decrypt(&sealed).await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_out_of_range_key_id_falls_back() {
        let keys = KeyManager::new(fast_config());
        let mut sealed = keys.encrypt(b"x", Algorithm::Aes256Gcm).await.unwrap();
        sealed.key_id = 17;
        assert_eq!(keys.decrypt(&sealed).await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_rotation_respects_minimum_gap() {
        let keys = KeyManager::new(KeyManagerConfig {
            min_rotation_gap: Duration::from_secs(3600),
            ..Default::default()
        });
        assert!(keys.rotate().await.unwrap());
        assert!(!keys.rotate().await.unwrap());
        assert_eq!(keys.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_rotation_runs_once() {
        let keys = Arc::new(KeyManager::new(KeyManagerConfig {
            min_rotation_gap: Duration::from_secs(3600),
            ..Default::default()
        }));
        keys.get_or_create_material().await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let keys = keys.clone();
            handles.push(tokio::spawn(async move { keys.rotate().await.unwrap() }));
        }
        let mut rotated = 0;
        for handle in handles {
            if handle.await.unwrap() {
                rotated += 1;
            }
        }
        assert_eq!(rotated, 1);
        assert_eq!(keys.len(), 2);
    }

    #[tokio::test]
    async fn test_materials_persist_across_instances() {
        let dir = tempdir().unwrap();
        let file = KeyFile::new(dir.path().join("keys.json"));
        let config = KeyManagerConfig {
            key_file: Some(file.clone()),
            ..fast_config()
        };

        let first = KeyManager::open(config.clone()).await;
        let sealed = first.encrypt(b"durable", Algorithm::Aes256Gcm).await.unwrap();
        rotate_now(&first).await;
        assert_eq!(file.load().await.unwrap().len(), 2);

        let second = KeyManager::open(config).await;
        assert_eq!(second.len(), 2);
        assert_eq!(second.fingerprints(), first.fingerprints());
        assert_eq!(second.decrypt(&sealed).await.unwrap(), b"durable");
    }

    #[tokio::test]
    async fn test_corrupt_key_file_regenerated_on_first_use() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(&path, b"{broken").unwrap();
        let file = KeyFile::new(&path);

        let keys = KeyManager::open(KeyManagerConfig {
            key_file: Some(file.clone()),
            ..fast_config()
        })
        .await;

        let sealed = keys.encrypt(b"x", Algorithm::Aes256Gcm).await.unwrap();
        assert_eq!(keys.decrypt(&sealed).await.unwrap(), b"x");
        assert_eq!(keys.len(), 1);

        // Fresh material replaces the broken file; the old bytes are kept aside
        assert_eq!(file.load().await.unwrap().len(), 1);
        assert_eq!(std::fs::read(dir.path().join("keys.json.corrupt")).unwrap(), b"{broken");

        // A later process reads the regenerated material
        let reopened = KeyManager::open(KeyManagerConfig {
            key_file: Some(file),
            ..fast_config()
        })
        .await;
        assert_eq!(reopened.fingerprints(), keys.fingerprints());
    }
}
