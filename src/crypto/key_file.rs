// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable side-file for key material.
//!
//! Format: a JSON array of `{"key", "iv", "createdAt"}` objects, oldest first,
//! with `key`/`iv` base64-encoded. A missing file means "no materials yet".
//! Writes go to a sibling temp file and are renamed into place.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CryptoError, EncryptionMaterial};

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MaterialRecord {
    #[serde(with = "super::b64")]
    key: Vec<u8>,
    #[serde(with = "super::b64")]
    iv: Vec<u8>,
    created_at: i64,
}

#[derive(Debug, Clone)]
pub struct KeyFile {
    path: PathBuf,
}

impl KeyFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all materials, oldest first. Missing file yields an empty list.
    pub async fn load(&self) -> Result<Vec<EncryptionMaterial>, CryptoError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No key file yet");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(CryptoError::KeyFile(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let records: Vec<MaterialRecord> = serde_json::from_slice(&bytes).map_err(|e| {
            CryptoError::KeyFile(format!("failed to parse {}: {}", self.path.display(), e))
        })?;

        Ok(records
            .into_iter()
            .map(|r| EncryptionMaterial::from_parts(r.key, r.iv, r.created_at))
            .collect())
    }

    /// Replace the file contents with `materials`.
    pub async fn save(&self, materials: &[EncryptionMaterial]) -> Result<(), CryptoError> {
        let records: Vec<MaterialRecord> = materials
            .iter()
            .map(|m| MaterialRecord {
                key: m.key().to_vec(),
                iv: m.iv().to_vec(),
                created_at: m.created_at(),
            })
            .collect();

        let json = serde_json::to_vec_pretty(&records)
            .map_err(|e| CryptoError::KeyFile(format!("failed to serialize key material: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| self.io_error("create directory for", e))?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &json).await.map_err(|e| self.io_error("write", e))?;
        restrict_permissions(&tmp).await;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| self.io_error("replace", e))?;

        debug!(path = %self.path.display(), count = materials.len(), "Key file saved");
        Ok(())
    }

    /// Move an unreadable file aside to `<name>.corrupt` so a fresh save
    /// does not destroy it. Returns the new path.
    pub async fn quarantine(&self) -> Result<PathBuf, CryptoError> {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".corrupt");
        let target = self.path.with_file_name(name);
        tokio::fs::rename(&self.path, &target)
            .await
            .map_err(|e| self.io_error("move aside", e))?;
        Ok(target)
    }

    fn io_error(&self, action: &str, e: std::io::Error) -> CryptoError {
        CryptoError::KeyFile(format!("failed to {} {}: {}", action, self.path.display(), e))
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await {
        tracing::warn!(path = %path.display(), error = %e, "Could not restrict key file permissions");
    }
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) {}
