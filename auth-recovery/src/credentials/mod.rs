//! Credential records, header application and credential storage backends.

pub mod encryption;
mod file_store;
mod record;
mod storage;

pub use file_store::EncryptedFileStore;
pub use record::{
    CredentialDraft, CredentialRecord, HeaderAssignment, SecretRef, Secrets, DEFAULT_API_KEY_HEADER,
};
pub use storage::{CredentialStore, MemoryStore, StoredCredentialSummary};
