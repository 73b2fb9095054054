//! Wiring from `Config` to the recovery components.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use auth_recovery::credentials::{
    CredentialDraft, CredentialStore, EncryptedFileStore, MemoryStore, DEFAULT_API_KEY_HEADER,
};
use auth_recovery::http::{HttpClientBuilder, HttpExecutor, RequestExecutor};
use auth_recovery::inference::{HeuristicRule, SchemeInferencer};
use auth_recovery::ledger::{LedgerSnapshot, RetryLedger};
use auth_recovery::prompt::{ConsolePrompter, FixedPrompter, Prompter, StdTerminal};
use auth_recovery::RecoveryOrchestrator;
use log::*;
use secrecy::SecretString;
use service::config::Config;

use crate::output::print_warning;

pub struct App {
    pub config: Config,
    pub store: Arc<dyn CredentialStore>,
    pub ledger: Arc<RetryLedger>,
    pub executor: Arc<dyn RequestExecutor>,
    pub inferencer: SchemeInferencer,
    /// False when credentials only live for this process.
    pub durable_store: bool,
}

impl App {
    pub async fn from_config(config: Config) -> Result<Self> {
        let (store, durable_store): (Arc<dyn CredentialStore>, bool) = match config.credential_key() {
            Some(key) => {
                let store = EncryptedFileStore::new(
                    &config.credential_store,
                    SecretString::new(key.to_string()),
                )
                .context(
                    "CREDENTIAL_KEY must be 64 hex characters (create one with `restkit credentials generate-key`)",
                )?;
                debug!("Credential store: {}", store.path().display());
                (Arc::new(store), true)
            }
            None => {
                warn!("No CREDENTIAL_KEY configured; credentials will not be saved beyond this run");
                (Arc::new(MemoryStore::new()), false)
            }
        };

        let ledger = match &config.ledger_state {
            Some(path) => RetryLedger::from_snapshot(
                LedgerSnapshot::load(path)
                    .await
                    .with_context(|| format!("Failed to read ledger state {}", path.display()))?,
            ),
            None => RetryLedger::new(),
        };

        let client = HttpClientBuilder::new()
            .with_timeout(config.timeout())
            .with_transient_retries(config.transient_retries)
            .build()
            .context("Failed to build HTTP client")?;

        let inferencer = match &config.scheme_hints {
            Some(path) => SchemeInferencer::new().extend(load_scheme_hints(path)?),
            None => SchemeInferencer::new(),
        };

        Ok(Self {
            config,
            store,
            ledger: Arc::new(ledger),
            executor: Arc::new(HttpExecutor::new(client)),
            inferencer,
            durable_store,
        })
    }

    /// Console prompting, or fixed answers from the command line with `--non-interactive`.
    pub fn prompter(&self) -> Arc<dyn Prompter> {
        if self.config.non_interactive {
            Arc::new(FixedPrompter::new(
                self.configured_credential(),
                self.config.persist_credentials,
            ))
        } else {
            Arc::new(ConsolePrompter::new(Arc::new(StdTerminal::new())))
        }
    }

    pub fn orchestrator(&self) -> RecoveryOrchestrator {
        RecoveryOrchestrator::new(
            Arc::clone(&self.executor),
            Arc::clone(&self.store),
            self.prompter(),
            Arc::clone(&self.ledger),
        )
        .with_inferencer(self.inferencer.clone())
    }

    /// Write the ledger back when `--ledger-state` is set.
    pub async fn save_ledger(&self) -> Result<()> {
        if let Some(path) = &self.config.ledger_state {
            self.ledger
                .snapshot()
                .await
                .save(path)
                .await
                .with_context(|| format!("Failed to write ledger state {}", path.display()))?;
        }
        Ok(())
    }

    /// `save_ledger` for commands whose own outcome must not be masked by a failed write.
    pub async fn save_ledger_or_warn(&self) {
        if let Err(e) = self.save_ledger().await {
            warn!("{:?}", e);
            print_warning(&format!("{e:#}"));
        }
    }

    fn configured_credential(&self) -> Option<CredentialDraft> {
        let config = &self.config;
        if let Some(token) = config.auth_token() {
            return Some(CredentialDraft::bearer(SecretString::new(token.to_string())));
        }
        if let Some(key) = config.api_key() {
            let header = config
                .api_key_header
                .as_deref()
                .unwrap_or(DEFAULT_API_KEY_HEADER);
            return Some(CredentialDraft::api_key(
                header,
                SecretString::new(key.to_string()),
            ));
        }
        config.basic_username.as_ref().map(|username| {
            CredentialDraft::basic(
                username,
                SecretString::new(config.basic_password().unwrap_or_default().to_string()),
            )
        })
    }
}

fn load_scheme_hints(path: &Path) -> Result<Vec<HeuristicRule>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scheme hints {}", path.display()))?;
    let rules: Vec<HeuristicRule> = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid scheme hints in {}", path.display()))?;
    info!("Loaded {} scheme hint rule(s) from {}", rules.len(), path.display());
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth_recovery::AuthScheme;
    use clap::Parser;

    fn config(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("restkit").chain(args.iter().copied())).unwrap()
    }

    #[tokio::test]
    async fn test_without_key_store_is_in_memory() {
        let app = App::from_config(config(&["credentials", "list"])).await.unwrap();
        assert!(!app.durable_store);
    }

    #[tokio::test]
    async fn test_bad_key_is_rejected() {
        let result = App::from_config(config(&["--credential-key", "abc", "credentials", "list"])).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_configured_credential_prefers_token() {
        let app = App::from_config(config(&[
            "--auth-token",
            "t",
            "--api-key",
            "k",
            "credentials",
            "list",
        ]))
        .await
        .unwrap();
        assert_eq!(app.configured_credential().unwrap().scheme, AuthScheme::Bearer);
    }

    #[tokio::test]
    async fn test_configured_api_key_uses_named_header() {
        let app = App::from_config(config(&[
            "--api-key",
            "k",
            "--api-key-header",
            "X-Auth",
            "credentials",
            "list",
        ]))
        .await
        .unwrap();
        let draft = app.configured_credential().unwrap();
        assert_eq!(draft.scheme, AuthScheme::ApiKey);
        assert_eq!(draft.header_assignments[0].name, "X-Auth");
    }

    #[tokio::test]
    async fn test_configured_api_key_defaults_header() {
        let app = App::from_config(config(&["--api-key", "k", "credentials", "list"]))
            .await
            .unwrap();
        let draft = app.configured_credential().unwrap();
        assert_eq!(draft.header_assignments[0].name, DEFAULT_API_KEY_HEADER);
    }

    #[test]
    fn test_scheme_hints_parse() {
        let path = std::env::temp_dir().join("restkit-hints-test.json");
        std::fs::write(
            &path,
            r#"[{"matcher": {"kind": "host", "pattern": "*.corp.example"}, "scheme": "basic", "evidence": "internal gateway"}]"#,
        )
        .unwrap();

        let rules = load_scheme_hints(&path).unwrap();

        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].scheme, AuthScheme::Basic);
    }
}
