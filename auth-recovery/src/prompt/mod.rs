//! Collecting credentials from a person (or something standing in for one).

mod console;
mod terminal;

use async_trait::async_trait;
use dashmap::DashSet;
use log::*;

use crate::credentials::CredentialDraft;
use crate::endpoint::Endpoint;
use crate::error::{cancelled, Error};
use crate::scheme::InferenceCandidate;

pub use console::ConsolePrompter;
pub use terminal::{ScriptedTerminal, StdTerminal, Terminal};

/// Obtains a credential for an endpoint that rejected a request.
///
/// Returning an error for which [`Error::is_cancelled`] holds means the user aborted; the
/// orchestrator treats that as terminal and does not count it as a failed attempt.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Present the ranked candidates and collect the secrets for the chosen scheme.
    async fn collect(
        &self,
        endpoint: &Endpoint,
        candidates: &[InferenceCandidate],
    ) -> Result<CredentialDraft, Error>;

    /// Whether the credential just collected should be saved once it works.
    async fn ask_persist(&self, endpoint: &Endpoint) -> Result<bool, Error>;

    /// The endpoint rejected the credential this prompter last collected for it.
    async fn rejected(&self, _endpoint: &Endpoint) {}
}

/// Non-interactive prompter answering every request with the same credential.
///
/// With no credential configured every `collect` is a cancellation. Once an endpoint has
/// rejected the configured credential, further `collect` calls for it cancel too.
#[derive(Debug, Default)]
pub struct FixedPrompter {
    draft: Option<CredentialDraft>,
    persist: bool,
    rejected_by: DashSet<Endpoint>,
}

impl FixedPrompter {
    pub fn new(draft: Option<CredentialDraft>, persist: bool) -> Self {
        Self {
            draft,
            persist,
            rejected_by: DashSet::new(),
        }
    }

    /// A prompter that always cancels.
    pub fn cancelling() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Prompter for FixedPrompter {
    async fn collect(
        &self,
        endpoint: &Endpoint,
        _candidates: &[InferenceCandidate],
    ) -> Result<CredentialDraft, Error> {
        match &self.draft {
            Some(draft) if self.rejected_by.contains(endpoint) => {
                warn!(
                    "{} already rejected the configured {} credential",
                    endpoint, draft.scheme
                );
                Err(cancelled())
            }
            Some(draft) => {
                info!("Using configured {} credential for {}", draft.scheme, endpoint);
                Ok(draft.clone())
            }
            None => {
                warn!(
                    "{} requires authentication and no credential was configured for non-interactive use",
                    endpoint
                );
                Err(cancelled())
            }
        }
    }

    async fn ask_persist(&self, _endpoint: &Endpoint) -> Result<bool, Error> {
        Ok(self.persist)
    }

    async fn rejected(&self, endpoint: &Endpoint) {
        self.rejected_by.insert(endpoint.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::AuthScheme;
    use secrecy::SecretString;

    fn endpoint() -> Endpoint {
        Endpoint::parse("https://api.example.com").unwrap()
    }

    #[tokio::test]
    async fn test_fixed_prompter_returns_configured_draft() {
        let prompter = FixedPrompter::new(
            Some(CredentialDraft::bearer(SecretString::new("t".to_string()))),
            true,
        );

        let draft = prompter.collect(&endpoint(), &[]).await.unwrap();

        assert_eq!(draft.scheme, AuthScheme::Bearer);
        assert!(prompter.ask_persist(&endpoint()).await.unwrap());
    }

    #[tokio::test]
    async fn test_fixed_prompter_without_draft_cancels() {
        let prompter = FixedPrompter::cancelling();
        let err = prompter.collect(&endpoint(), &[]).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!prompter.ask_persist(&endpoint()).await.unwrap());
    }

    #[tokio::test]
    async fn test_fixed_prompter_stops_after_rejection() {
        let prompter = FixedPrompter::new(
            Some(CredentialDraft::bearer(SecretString::new("bad".to_string()))),
            false,
        );
        let other = Endpoint::parse("https://other.example.com").unwrap();

        prompter.rejected(&endpoint()).await;

        assert!(prompter.collect(&endpoint(), &[]).await.unwrap_err().is_cancelled());
        assert!(prompter.collect(&other, &[]).await.is_ok());
    }
}
