//! JSON file credential store with AES-256-GCM encrypted secrets.
//!
//! Layout:
//!
//! ```json
//! { "records": { "https://mgmt.local:8443": {
//!     "endpoint": "https://mgmt.local:8443", "scheme": "bearer",
//!     "header_assignments": [{"name": "authorization", "template": "Bearer {token}"}],
//!     "secret_ref": "…uuid…", "created_at": "…", "updated_at": "…",
//!     "secrets": {"token": "<base64 nonce+ciphertext>"} } } }
//! ```
//!
//! Only secret values are encrypted; header names and templates stay readable so
//! `credentials list` works without the key being correct.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::encryption::{decrypt, encrypt, validate_key};
use super::{
    CredentialRecord, CredentialStore, HeaderAssignment, SecretRef, Secrets,
    StoredCredentialSummary,
};
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::scheme::AuthScheme;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    records: BTreeMap<String, StoredRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    endpoint: Endpoint,
    scheme: AuthScheme,
    header_assignments: Vec<HeaderAssignment>,
    secret_ref: SecretRef,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Secret name -> encrypted value.
    secrets: BTreeMap<String, String>,
}

impl StoredRecord {
    fn summary(&self) -> StoredCredentialSummary {
        StoredCredentialSummary {
            endpoint: self.endpoint.clone(),
            scheme: self.scheme,
            header_names: self
                .header_assignments
                .iter()
                .map(|a| a.name.clone())
                .collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Credential store persisted to a single JSON file.
///
/// Writes go to a sibling temp file that is renamed over the original, so a crash never
/// leaves a half-written store. An in-process mutex serializes read-modify-write cycles.
pub struct EncryptedFileStore {
    path: PathBuf,
    key_hex: SecretString,
    lock: Mutex<()>,
}

impl EncryptedFileStore {
    /// Create a store at `path`. The key must be 64 hex characters.
    pub fn new(path: impl Into<PathBuf>, key_hex: SecretString) -> Result<Self, Error> {
        validate_key(key_hex.expose_secret())?;
        Ok(Self {
            path: path.into(),
            key_hex,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<StoreFile, Error> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(StoreFile::default()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, file: &StoreFile) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let contents = serde_json::to_string_pretty(file)?;
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, contents).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    fn seal(&self, record: &CredentialRecord) -> Result<BTreeMap<String, String>, Error> {
        record
            .secrets()
            .iter()
            .map(|(name, value)| {
                encrypt(value.expose_secret(), self.key_hex.expose_secret())
                    .map(|sealed| (name.clone(), sealed))
            })
            .collect()
    }

    fn open(&self, stored: StoredRecord) -> Result<CredentialRecord, Error> {
        let mut secrets = Secrets::new();
        for (name, sealed) in &stored.secrets {
            let plain = decrypt(sealed, self.key_hex.expose_secret())?;
            secrets.insert(name.clone(), SecretString::new(plain));
        }
        Ok(CredentialRecord::from_parts(
            stored.endpoint,
            stored.scheme,
            stored.header_assignments,
            stored.secret_ref,
            stored.created_at,
            stored.updated_at,
            true,
            secrets,
        ))
    }
}

#[async_trait]
impl CredentialStore for EncryptedFileStore {
    async fn save(&self, endpoint: &Endpoint, record: &CredentialRecord) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let mut file = self.read_file().await?;
        let key = endpoint.to_string();

        let created_at = file
            .records
            .get(&key)
            .map(|existing| existing.created_at)
            .unwrap_or(record.created_at);

        let stored = StoredRecord {
            endpoint: endpoint.clone(),
            scheme: record.scheme,
            header_assignments: record.header_assignments.clone(),
            secret_ref: record.secret_ref.clone(),
            created_at,
            updated_at: Utc::now(),
            secrets: self.seal(record)?,
        };
        file.records.insert(key, stored);
        self.write_file(&file).await?;

        info!(
            "Saved {} credential for {} to {}",
            record.scheme,
            endpoint,
            self.path.display()
        );
        Ok(())
    }

    async fn load(&self, endpoint: &Endpoint) -> Result<Option<CredentialRecord>, Error> {
        let _guard = self.lock.lock().await;
        let mut file = self.read_file().await?;
        match file.records.remove(&endpoint.to_string()) {
            Some(stored) => {
                debug!("Loaded saved credential for {}", endpoint);
                self.open(stored).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, endpoint: &Endpoint) -> Result<bool, Error> {
        let _guard = self.lock.lock().await;
        let mut file = self.read_file().await?;
        let existed = file.records.remove(&endpoint.to_string()).is_some();
        if existed {
            self.write_file(&file).await?;
        }
        Ok(existed)
    }

    async fn list(&self) -> Result<Vec<StoredCredentialSummary>, Error> {
        let _guard = self.lock.lock().await;
        let file = self.read_file().await?;
        Ok(file.records.values().map(StoredRecord::summary).collect())
    }
}
