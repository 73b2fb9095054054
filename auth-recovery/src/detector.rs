//! Classifies completed requests as authentication failures or something else.

use reqwest::header::HeaderMap;
use reqwest::StatusCode;

use crate::error::Error;

/// Outcome of classifying a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The remote rejected our credentials (or lack of them).
    AuthFailure,
    /// Anything else. Propagated unchanged, never retried.
    Unrelated,
}

/// Pure status-based failure classifier.
///
/// Only the configured auth statuses (401 and 403 by default) count as authentication
/// failures. The body is never consulted: a 500 that mentions "unauthorized" is still a 500.
#[derive(Debug, Clone)]
pub struct FailureDetector {
    auth_statuses: Vec<StatusCode>,
}

impl FailureDetector {
    pub fn new() -> Self {
        Self {
            auth_statuses: vec![StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN],
        }
    }

    /// Classify a response that was received from the server.
    pub fn classify(&self, status: StatusCode, _headers: &HeaderMap, _body: &str) -> Classification {
        if self.auth_statuses.contains(&status) {
            Classification::AuthFailure
        } else {
            Classification::Unrelated
        }
    }

    /// Transport errors (timeout, DNS, refused connection) never consume retry budget.
    pub fn classify_transport(&self, _error: &Error) -> Classification {
        Classification::Unrelated
    }
}

impl Default for FailureDetector {
    fn default() -> Self {
        Self::new()
    }
}
