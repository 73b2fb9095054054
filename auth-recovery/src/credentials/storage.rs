//! Credential storage trait and the in-memory backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use super::CredentialRecord;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::scheme::AuthScheme;

/// What a store can say about a record without exposing secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredCredentialSummary {
    pub endpoint: Endpoint,
    pub scheme: AuthScheme,
    pub header_names: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&CredentialRecord> for StoredCredentialSummary {
    fn from(record: &CredentialRecord) -> Self {
        Self {
            endpoint: record.endpoint.clone(),
            scheme: record.scheme,
            header_names: record.header_names(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Trait for storing credential records keyed by endpoint.
///
/// Implementations should:
/// - Encrypt secret material at rest
/// - Keep `created_at` when a record is overwritten and bump `updated_at`
/// - Handle concurrent access safely
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Store (or overwrite) the record for an endpoint.
    async fn save(&self, endpoint: &Endpoint, record: &CredentialRecord) -> Result<(), Error>;

    /// Retrieve the record for an endpoint, `None` if there is none.
    async fn load(&self, endpoint: &Endpoint) -> Result<Option<CredentialRecord>, Error>;

    /// Delete the record for an endpoint. Returns whether one existed.
    async fn delete(&self, endpoint: &Endpoint) -> Result<bool, Error>;

    /// Summaries of every stored record.
    async fn list(&self) -> Result<Vec<StoredCredentialSummary>, Error>;
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<Endpoint, CredentialRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn save(&self, endpoint: &Endpoint, record: &CredentialRecord) -> Result<(), Error> {
        let mut stored = record.clone();
        stored.endpoint = endpoint.clone();
        stored.persisted = true;
        stored.updated_at = Utc::now();
        if let Some(existing) = self.records.get(endpoint) {
            stored.created_at = existing.created_at;
        }
        self.records.insert(endpoint.clone(), stored);
        Ok(())
    }

    async fn load(&self, endpoint: &Endpoint) -> Result<Option<CredentialRecord>, Error> {
        Ok(self.records.get(endpoint).map(|r| r.value().clone()))
    }

    async fn delete(&self, endpoint: &Endpoint) -> Result<bool, Error> {
        Ok(self.records.remove(endpoint).is_some())
    }

    async fn list(&self) -> Result<Vec<StoredCredentialSummary>, Error> {
        let mut summaries: Vec<StoredCredentialSummary> = self
            .records
            .iter()
            .map(|entry| StoredCredentialSummary::from(entry.value()))
            .collect();
        summaries.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialDraft;
    use secrecy::SecretString;

    fn endpoint() -> Endpoint {
        Endpoint::parse("https://mgmt.local:8443").unwrap()
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = MemoryStore::new();
        let record = CredentialDraft::bearer(SecretString::new("t".to_string())).into_record(&endpoint());

        store.save(&endpoint(), &record).await.unwrap();
        let loaded = store.load(&endpoint()).await.unwrap().unwrap();

        assert!(loaded.persisted);
        assert_eq!(loaded.scheme, AuthScheme::Bearer);
        assert_eq!(loaded.secret_ref, record.secret_ref);
    }

    #[tokio::test]
    async fn test_overwrite_keeps_created_at() {
        let store = MemoryStore::new();
        let first = CredentialDraft::bearer(SecretString::new("a".to_string())).into_record(&endpoint());
        store.save(&endpoint(), &first).await.unwrap();
        let created = store.load(&endpoint()).await.unwrap().unwrap().created_at;

        let second = CredentialDraft::api_key("X-Key", SecretString::new("b".to_string()))
            .into_record(&endpoint());
        store.save(&endpoint(), &second).await.unwrap();
        let loaded = store.load(&endpoint()).await.unwrap().unwrap();

        assert_eq!(loaded.created_at, created);
        assert_eq!(loaded.scheme, AuthScheme::ApiKey);
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let store = MemoryStore::new();
        let record = CredentialDraft::bearer(SecretString::new("t".to_string())).into_record(&endpoint());
        store.save(&endpoint(), &record).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].header_names, vec!["authorization"]);

        assert!(store.delete(&endpoint()).await.unwrap());
        assert!(!store.delete(&endpoint()).await.unwrap());
        assert!(store.load(&endpoint()).await.unwrap().is_none());
    }
}
