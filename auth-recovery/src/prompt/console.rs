//! Interactive credential collection over a `Terminal`.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use log::*;
use reqwest::header::HeaderName;
use secrecy::SecretString;
use tokio::task::JoinHandle;

use super::{Prompter, Terminal};
use crate::credentials::{CredentialDraft, DEFAULT_API_KEY_HEADER};
use crate::endpoint::Endpoint;
use crate::error::{cancelled, Error, ErrorKind, PromptErrorKind};
use crate::scheme::{AuthScheme, InferenceCandidate};

/// Menu-driven prompter. Blocking terminal work runs on tokio's blocking pool and is raced
/// against Ctrl-C, which cancels recovery.
pub struct ConsolePrompter<T: Terminal> {
    terminal: Arc<T>,
}

impl<T: Terminal> ConsolePrompter<T> {
    pub fn new(terminal: Arc<T>) -> Self {
        Self { terminal }
    }

    pub fn terminal(&self) -> &Arc<T> {
        &self.terminal
    }
}

#[async_trait]
impl<T: Terminal> Prompter for ConsolePrompter<T> {
    async fn collect(
        &self,
        endpoint: &Endpoint,
        candidates: &[InferenceCandidate],
    ) -> Result<CredentialDraft, Error> {
        let terminal = Arc::clone(&self.terminal);
        let endpoint = endpoint.clone();
        let candidates = candidates.to_vec();
        let task = tokio::task::spawn_blocking(move || {
            collect_credential(terminal.as_ref(), &endpoint, &candidates)
        });
        until_interrupted(task, self.terminal.as_ref(), interrupted()).await
    }

    async fn ask_persist(&self, endpoint: &Endpoint) -> Result<bool, Error> {
        let terminal = Arc::clone(&self.terminal);
        let endpoint = endpoint.clone();
        let task = tokio::task::spawn_blocking(move || ask_persist(terminal.as_ref(), &endpoint));
        until_interrupted(task, self.terminal.as_ref(), interrupted()).await
    }
}

/// The blocking read is left behind on interrupt; the terminal mode it changed is restored.
async fn until_interrupted<R, T>(
    task: JoinHandle<Result<R, Error>>,
    terminal: &T,
    interrupt: impl Future<Output = ()>,
) -> Result<R, Error>
where
    R: Send + 'static,
    T: Terminal + ?Sized,
{
    tokio::select! {
        joined = task => joined.map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Prompt(PromptErrorKind::Interrupted),
        })?,
        _ = interrupt => {
            warn!("Interrupted while prompting for credentials");
            terminal.restore();
            Err(cancelled())
        }
    }
}

/// Resolves on Ctrl-C. If no handler can be installed it never resolves.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Menu entries: inferred candidates first, then the schemes inference did not propose.
fn menu_options(candidates: &[InferenceCandidate]) -> Vec<(AuthScheme, Option<&InferenceCandidate>)> {
    let mut options: Vec<(AuthScheme, Option<&InferenceCandidate>)> =
        candidates.iter().map(|c| (c.scheme, Some(c))).collect();
    for scheme in AuthScheme::MENU_ORDER {
        if !options.iter().any(|(s, _)| *s == scheme) {
            options.push((scheme, None));
        }
    }
    options
}

fn io_error(e: std::io::Error) -> Error {
    Error {
        source: Some(Box::new(e)),
        error_kind: ErrorKind::Prompt(PromptErrorKind::Io),
    }
}

fn say<T: Terminal + ?Sized>(terminal: &T, line: &str) -> Result<(), Error> {
    terminal.write_line(line).map_err(io_error)
}

/// A line of input; end of input cancels.
fn ask<T: Terminal + ?Sized>(terminal: &T, prompt: &str) -> Result<String, Error> {
    match terminal.read_line(prompt).map_err(io_error)? {
        Some(line) => Ok(line.trim().to_string()),
        None => Err(cancelled()),
    }
}

/// A secret that is not blank, kept exactly as typed; end of input cancels.
fn ask_secret<T: Terminal + ?Sized>(terminal: &T, prompt: &str) -> Result<SecretString, Error> {
    loop {
        match terminal.read_secret(prompt).map_err(io_error)? {
            Some(secret) if !secret.trim().is_empty() => {
                let secret = secret.trim_end_matches(['\r', '\n']);
                return Ok(SecretString::new(secret.to_string()));
            }
            Some(_) => say(terminal, "A value is required.")?,
            None => return Err(cancelled()),
        }
    }
}

fn ask_header_name<T: Terminal + ?Sized>(
    terminal: &T,
    prompt: &str,
    default: Option<&str>,
) -> Result<Option<String>, Error> {
    loop {
        let answer = ask(terminal, prompt)?;
        let name = match (answer.is_empty(), default) {
            (true, Some(default)) => default.to_string(),
            (true, None) => return Ok(None),
            (false, _) => answer,
        };
        if HeaderName::from_bytes(name.as_bytes()).is_ok() {
            return Ok(Some(name));
        }
        say(terminal, &format!("{name:?} is not a valid header name."))?;
    }
}

fn choose_scheme<T: Terminal + ?Sized>(
    terminal: &T,
    endpoint: &Endpoint,
    candidates: &[InferenceCandidate],
) -> Result<AuthScheme, Error> {
    let options = menu_options(candidates);

    say(terminal, &format!("Authentication required for {endpoint}."))?;
    say(terminal, "Choose how to authenticate:")?;
    for (index, (scheme, candidate)) in options.iter().enumerate() {
        let line = match candidate {
            Some(c) if c.evidence.is_empty() => {
                format!("  {}) {} [{}]", index + 1, scheme.label(), c.confidence)
            }
            Some(c) => format!(
                "  {}) {} [{}] ({})",
                index + 1,
                scheme.label(),
                c.confidence,
                c.evidence.join("; ")
            ),
            None => format!("  {}) {}", index + 1, scheme.label()),
        };
        say(terminal, &line)?;
    }

    let prompt = format!("Choice [1-{}, default 1, q to cancel]: ", options.len());
    loop {
        let answer = ask(terminal, &prompt)?;
        if answer.is_empty() {
            return Ok(options[0].0);
        }
        if answer.eq_ignore_ascii_case("q") || answer.eq_ignore_ascii_case("quit") {
            return Err(cancelled());
        }
        match answer.parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) => return Ok(options[n - 1].0),
            _ => say(
                terminal,
                &format!("Please enter a number between 1 and {}.", options.len()),
            )?,
        }
    }
}

/// Walk the user through choosing a scheme and entering its secrets.
pub(crate) fn collect_credential<T: Terminal + ?Sized>(
    terminal: &T,
    endpoint: &Endpoint,
    candidates: &[InferenceCandidate],
) -> Result<CredentialDraft, Error> {
    let scheme = choose_scheme(terminal, endpoint, candidates)?;
    debug!("User chose {} for {}", scheme, endpoint);

    let draft = match scheme {
        AuthScheme::ApiKey => {
            let header = ask_header_name(
                terminal,
                &format!("Header name [{DEFAULT_API_KEY_HEADER}]: "),
                Some(DEFAULT_API_KEY_HEADER),
            )?
            .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string());
            let key = ask_secret(terminal, "API key: ")?;
            CredentialDraft::api_key(&header, key)
        }
        AuthScheme::Bearer => CredentialDraft::bearer(ask_secret(terminal, "Token: ")?),
        AuthScheme::Basic => {
            let username = loop {
                let username = ask(terminal, "Username: ")?;
                if !username.is_empty() {
                    break username;
                }
                say(terminal, "A username is required.")?;
            };
            let password = ask_secret(terminal, "Password: ")?;
            CredentialDraft::basic(&username, password)
        }
        AuthScheme::Custom => {
            let mut headers = Vec::new();
            loop {
                match ask_header_name(terminal, "Header name (blank to finish): ", None)? {
                    Some(name) => {
                        let value = ask_secret(terminal, &format!("Value for {name}: "))?;
                        headers.push((name, value));
                    }
                    None if headers.is_empty() => {
                        say(terminal, "At least one header is required.")?
                    }
                    None => break,
                }
            }
            CredentialDraft::custom(headers)
        }
    };

    Ok(draft)
}

/// y/N question; end of input means no.
pub(crate) fn ask_persist<T: Terminal + ?Sized>(
    terminal: &T,
    endpoint: &Endpoint,
) -> Result<bool, Error> {
    let prompt = format!("Save this credential for {endpoint}? [y/N]: ");
    match terminal.read_line(&prompt).map_err(io_error)? {
        Some(answer) => {
            let answer = answer.trim();
            Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ScriptedTerminal;
    use crate::scheme::Confidence;
    use reqwest::header::{HeaderMap, AUTHORIZATION};

    fn endpoint() -> Endpoint {
        Endpoint::parse("https://api.example.com/data").unwrap()
    }

    fn candidate(scheme: AuthScheme, confidence: Confidence, evidence: &str) -> InferenceCandidate {
        let mut c = InferenceCandidate::new(scheme, confidence);
        c.evidence.push(evidence.to_string());
        c
    }

    fn applied(draft: CredentialDraft) -> HeaderMap {
        let mut headers = HeaderMap::new();
        draft.into_record(&endpoint()).apply(&mut headers).unwrap();
        headers
    }

    #[test]
    fn test_empty_choice_selects_top_candidate() {
        let terminal = ScriptedTerminal::new(["", "", "k-1"]);
        let candidates = vec![candidate(AuthScheme::ApiKey, Confidence::Medium, "body mentions api key")];

        let draft = collect_credential(&terminal, &endpoint(), &candidates).unwrap();

        assert_eq!(draft.scheme, AuthScheme::ApiKey);
        assert_eq!(applied(draft).get("x-api-key").unwrap(), "k-1");
        let transcript = terminal.transcript();
        assert!(transcript.iter().any(|l| l.starts_with("  1) API key header [medium]")));
        assert!(transcript.iter().any(|l| l.starts_with("  2) Bearer token")));
    }

    #[test]
    fn test_menu_lists_remaining_schemes_after_candidates() {
        let candidates = vec![candidate(AuthScheme::Basic, Confidence::High, "challenge")];
        let options = menu_options(&candidates);
        let schemes: Vec<AuthScheme> = options.iter().map(|(s, _)| *s).collect();

        assert_eq!(
            schemes,
            vec![
                AuthScheme::Basic,
                AuthScheme::ApiKey,
                AuthScheme::Bearer,
                AuthScheme::Custom
            ]
        );
    }

    #[test]
    fn test_invalid_choice_reasks() {
        let terminal = ScriptedTerminal::new(["9", "abc", "2", "tok"]);
        let candidates = vec![candidate(AuthScheme::ApiKey, Confidence::Medium, "x")];

        let draft = collect_credential(&terminal, &endpoint(), &candidates).unwrap();

        assert_eq!(draft.scheme, AuthScheme::Bearer);
        assert_eq!(applied(draft).get(AUTHORIZATION).unwrap(), "Bearer tok");
        let reasks = terminal
            .transcript()
            .iter()
            .filter(|l| l.starts_with("Please enter a number"))
            .count();
        assert_eq!(reasks, 2);
    }

    #[test]
    fn test_q_cancels() {
        let terminal = ScriptedTerminal::new(["q"]);
        let result = collect_credential(&terminal, &endpoint(), &[]);
        assert!(result.unwrap_err().is_cancelled());
    }

    #[test]
    fn test_end_of_input_mid_flow_cancels() {
        let terminal = ScriptedTerminal::new(["3", "admin"]);
        let result = collect_credential(&terminal, &endpoint(), &[]);
        assert!(result.unwrap_err().is_cancelled());
    }

    #[test]
    fn test_empty_secret_is_asked_again() {
        let terminal = ScriptedTerminal::new(["2", "  ", "tok-2"]);
        let draft = collect_credential(&terminal, &endpoint(), &[]).unwrap();
        assert_eq!(applied(draft).get(AUTHORIZATION).unwrap(), "Bearer tok-2");
    }

    #[test]
    fn test_basic_collects_username_and_password() {
        let terminal = ScriptedTerminal::new(["3", "admin", "s3cret"]);
        let draft = collect_credential(&terminal, &endpoint(), &[]).unwrap();
        assert_eq!(
            applied(draft).get(AUTHORIZATION).unwrap(),
            "Basic YWRtaW46czNjcmV0"
        );
    }

    #[test]
    fn test_secret_whitespace_is_kept() {
        let terminal = ScriptedTerminal::new(["3", "admin", "  pa ss  \n"]);
        let draft = collect_credential(&terminal, &endpoint(), &[]).unwrap();
        assert_eq!(
            applied(draft).get(AUTHORIZATION).unwrap(),
            "Basic YWRtaW46ICBwYSBzcyAg"
        );
    }

    #[test]
    fn test_custom_requires_one_header_and_stops_on_blank() {
        let terminal = ScriptedTerminal::new(["4", "", "X-Auth-User", "ops", "bad header", "X-Auth-Key", "abc", ""]);
        let draft = collect_credential(&terminal, &endpoint(), &[]).unwrap();

        assert_eq!(draft.scheme, AuthScheme::Custom);
        let headers = applied(draft);
        assert_eq!(headers.get("x-auth-user").unwrap(), "ops");
        assert_eq!(headers.get("x-auth-key").unwrap(), "abc");
        let transcript = terminal.transcript();
        assert!(transcript.contains(&"At least one header is required.".to_string()));
        assert!(transcript.iter().any(|l| l.contains("is not a valid header name")));
    }

    #[test]
    fn test_api_key_accepts_custom_header_name() {
        let terminal = ScriptedTerminal::new(["1", "X-Token", "k"]);
        let draft = collect_credential(&terminal, &endpoint(), &[]).unwrap();
        assert_eq!(applied(draft).get("x-token").unwrap(), "k");
    }

    #[test]
    fn test_ask_persist_defaults_to_no() {
        let endpoint = endpoint();
        assert!(ask_persist(&ScriptedTerminal::new(["y"]), &endpoint).unwrap());
        assert!(ask_persist(&ScriptedTerminal::new(["YES"]), &endpoint).unwrap());
        assert!(!ask_persist(&ScriptedTerminal::new([""]), &endpoint).unwrap());
        assert!(!ask_persist(&ScriptedTerminal::new(Vec::<String>::new()), &endpoint).unwrap());
    }

    #[tokio::test]
    async fn test_console_prompter_runs_on_blocking_pool() {
        let terminal = Arc::new(ScriptedTerminal::new(["2", "tok-9", "y"]));
        let prompter = ConsolePrompter::new(Arc::clone(&terminal));
        let candidates = vec![candidate(AuthScheme::ApiKey, Confidence::Medium, "x")];

        let draft = prompter.collect(&endpoint(), &candidates).await.unwrap();
        let persist = prompter.ask_persist(&endpoint()).await.unwrap();

        assert_eq!(draft.scheme, AuthScheme::Bearer);
        assert!(persist);
        assert_eq!(terminal.remaining_answers(), 0);
    }

    #[tokio::test]
    async fn test_interrupt_restores_terminal_and_cancels() {
        let terminal = ScriptedTerminal::new(Vec::<String>::new());
        let abandoned = tokio::spawn(std::future::pending::<Result<(), Error>>());

        let result = until_interrupted(abandoned, &terminal, std::future::ready(())).await;

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(terminal.restores(), 1);
    }
}
