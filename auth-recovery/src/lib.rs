//! # auth-recovery
//!
//! Recovery from authentication failures for tools that call REST management APIs.
//!
//! A request that comes back 401/403 is not simply reported: the crate works out which
//! authentication scheme the server probably wants, obtains a credential (saved, or from the
//! user), and retries with it, at most twice per endpoint before locking that endpoint out.
//!
//! ## Components
//!
//! - [`http`]: `RequestExecutor` trait and the reqwest-backed `HttpExecutor`
//! - [`detector`]: classifies responses as auth failures or unrelated errors
//! - [`inference`]: ranks likely schemes from challenges, body keywords and known hosts
//! - [`credentials`]: credential records, header application, memory and encrypted file stores
//! - [`prompt`]: console and non-interactive credential collection
//! - [`ledger`]: per-endpoint retry ceiling and lockout
//! - [`orchestrator`]: ties the above into detect, infer, obtain, retry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auth_recovery::{
//!     credentials::MemoryStore,
//!     http::{ApiRequest, HttpClientBuilder, HttpExecutor},
//!     ledger::RetryLedger,
//!     orchestrator::RecoveryOrchestrator,
//!     prompt::{ConsolePrompter, StdTerminal},
//! };
//!
//! let executor = Arc::new(HttpExecutor::new(HttpClientBuilder::new().build()?));
//! let orchestrator = RecoveryOrchestrator::new(
//!     executor,
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(ConsolePrompter::new(Arc::new(StdTerminal::new()))),
//!     Arc::new(RetryLedger::new()),
//! );
//! let recovered = orchestrator.execute(ApiRequest::get("https://api.example.com/data")?).await?;
//! ```

pub mod credentials;
pub mod detector;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod inference;
pub mod ledger;
pub mod orchestrator;
pub mod prompt;
pub mod scheme;

// Re-export commonly used types
pub use endpoint::Endpoint;
pub use error::{Error, ErrorKind};
pub use orchestrator::{CredentialSource, PersistenceOutcome, Recovered, RecoveryOrchestrator};
pub use scheme::{AuthScheme, Confidence, InferenceCandidate};
