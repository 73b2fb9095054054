//! Authentication schemes and inference candidates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of ways a credential can be attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// Key sent in a named header (e.g. `X-API-Key: xxx`).
    ApiKey,
    /// `Authorization: Bearer <token>`.
    Bearer,
    /// `Authorization: Basic base64(user:password)`.
    Basic,
    /// Arbitrary header/value pairs.
    Custom,
}

impl AuthScheme {
    /// Fixed menu order used when nothing better is known.
    pub const MENU_ORDER: [AuthScheme; 4] = [
        AuthScheme::ApiKey,
        AuthScheme::Bearer,
        AuthScheme::Basic,
        AuthScheme::Custom,
    ];

    /// Get the scheme identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::ApiKey => "api_key",
            AuthScheme::Bearer => "bearer",
            AuthScheme::Basic => "basic",
            AuthScheme::Custom => "custom",
        }
    }

    /// Human readable label for menus.
    pub fn label(&self) -> &'static str {
        match self {
            AuthScheme::ApiKey => "API key header",
            AuthScheme::Bearer => "Bearer token",
            AuthScheme::Basic => "Basic (username/password)",
            AuthScheme::Custom => "Custom headers",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How strongly the evidence points at a scheme. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Confidence::Low => f.write_str("low"),
            Confidence::Medium => f.write_str("medium"),
            Confidence::High => f.write_str("high"),
        }
    }
}

/// A proposed scheme with the evidence that produced it. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceCandidate {
    pub scheme: AuthScheme,
    pub confidence: Confidence,
    pub evidence: Vec<String>,
}

impl InferenceCandidate {
    pub fn new(scheme: AuthScheme, confidence: Confidence) -> Self {
        Self {
            scheme,
            confidence,
            evidence: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
    }

    #[test]
    fn test_scheme_serde_names() {
        let json = serde_json::to_string(&AuthScheme::ApiKey).unwrap();
        assert_eq!(json, "\"api_key\"");
        let scheme: AuthScheme = serde_json::from_str("\"bearer\"").unwrap();
        assert_eq!(scheme, AuthScheme::Bearer);
    }
}
