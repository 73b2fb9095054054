//! Error types for the `auth-recovery` crate.
//!
//! Follows the same pattern as the other workspace crates: a root `Error` struct holding an
//! error kind tree and an optional source for chaining.

use std::error::Error as StdError;
use std::fmt;

use crate::endpoint::Endpoint;

/// Top-level error type for auth-recovery crate.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in auth-recovery.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// Transport failures and non-authentication HTTP responses. Never retried.
    Network(NetworkErrorKind),
    /// Terminal outcomes of the recovery state machine.
    Recovery(RecoveryErrorKind),
    Credential(CredentialErrorKind),
    Prompt(PromptErrorKind),
    Request(RequestErrorKind),
}

/// Errors from the HTTP transport or an unrelated (non-auth) response.
#[derive(Debug, PartialEq)]
pub enum NetworkErrorKind {
    Timeout,
    Connect,
    Request,
    Builder,
    /// The server answered with a status that is neither success nor an auth failure.
    UnexpectedStatus(u16),
}

/// Terminal outcomes surfaced by the recovery orchestrator.
#[derive(Debug, PartialEq)]
pub enum RecoveryErrorKind {
    /// The user aborted the credential prompt.
    UserCancelled,
    /// The endpoint reached its retry ceiling.
    LockoutExceeded { endpoint: Endpoint, attempts: u32 },
}

/// Errors from credential storage and header application.
#[derive(Debug, PartialEq)]
pub enum CredentialErrorKind {
    EncryptionFailed,
    DecryptionFailed,
    StorageFailed,
    InvalidTemplate,
}

/// Errors from the interactive prompt itself (not user cancellation).
#[derive(Debug, PartialEq)]
pub enum PromptErrorKind {
    Io,
    Interrupted,
}

/// Errors from malformed caller input.
#[derive(Debug, PartialEq)]
pub enum RequestErrorKind {
    InvalidEndpoint,
    InvalidHeader,
}

impl Error {
    /// True when the user aborted recovery, as opposed to the remote side rejecting us.
    pub fn is_cancelled(&self) -> bool {
        self.error_kind == ErrorKind::Recovery(RecoveryErrorKind::UserCancelled)
    }

    pub fn is_lockout(&self) -> bool {
        matches!(
            self.error_kind,
            ErrorKind::Recovery(RecoveryErrorKind::LockoutExceeded { .. })
        )
    }

    /// HTTP status of an unrelated response, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self.error_kind {
            ErrorKind::Network(NetworkErrorKind::UnexpectedStatus(status)) => Some(status),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Recovery(RecoveryErrorKind::LockoutExceeded { endpoint, attempts }) => {
                write!(
                    f,
                    "Authentication lockout for {endpoint}: {attempts} failed attempts reached the retry limit. \
                     No further automatic retries will be made until the endpoint is reset \
                     (`restkit ledger reset {endpoint}`)."
                )
            }
            ErrorKind::Recovery(RecoveryErrorKind::UserCancelled) => {
                write!(f, "Authentication recovery cancelled by user")
            }
            ErrorKind::Network(NetworkErrorKind::UnexpectedStatus(status)) => match &self.source {
                Some(source) => write!(f, "HTTP error: status {status}: {source}"),
                None => write!(f, "HTTP error: status {status}"),
            },
            ErrorKind::Network(kind) => write!(f, "Network error: {:?}", kind),
            ErrorKind::Credential(kind) => write!(f, "Credential error: {:?}", kind),
            ErrorKind::Prompt(kind) => write!(f, "Prompt error: {:?}", kind),
            ErrorKind::Request(kind) => match &self.source {
                Some(source) => write!(f, "Request error: {:?}: {source}", kind),
                None => write!(f, "Request error: {:?}", kind),
            },
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = if err.is_builder() {
            NetworkErrorKind::Builder
        } else if err.is_timeout() {
            NetworkErrorKind::Timeout
        } else if err.is_connect() {
            NetworkErrorKind::Connect
        } else {
            NetworkErrorKind::Request
        };

        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Network(error_kind),
        }
    }
}

impl From<reqwest_middleware::Error> for Error {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(err) => err.into(),
            reqwest_middleware::Error::Middleware(err) => Error {
                source: Some(err.into()),
                error_kind: ErrorKind::Network(NetworkErrorKind::Request),
            },
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Credential(CredentialErrorKind::StorageFailed),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Credential(CredentialErrorKind::StorageFailed),
        }
    }
}

/// Helper function to create credential errors.
pub fn credential_error(kind: CredentialErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Credential(kind),
    }
}

/// Helper function to create request errors.
pub fn request_error(kind: RequestErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Request(kind),
    }
}

/// The user walked away from the prompt.
pub fn cancelled() -> Error {
    Error {
        source: None,
        error_kind: ErrorKind::Recovery(RecoveryErrorKind::UserCancelled),
    }
}

/// The endpoint hit its retry ceiling.
pub fn lockout(endpoint: &Endpoint, attempts: u32) -> Error {
    Error {
        source: None,
        error_kind: ErrorKind::Recovery(RecoveryErrorKind::LockoutExceeded {
            endpoint: endpoint.clone(),
            attempts,
        }),
    }
}

/// A response whose status is neither success nor an auth failure.
pub fn unexpected_status(status: u16, body: &str) -> Error {
    let snippet: String = body.chars().take(200).collect();
    Error {
        source: if snippet.is_empty() {
            None
        } else {
            Some(snippet.into())
        },
        error_kind: ErrorKind::Network(NetworkErrorKind::UnexpectedStatus(status)),
    }
}
