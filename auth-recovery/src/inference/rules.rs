//! Data-driven inference rules.
//!
//! Each rule pairs one kind of evidence (a `WWW-Authenticate` challenge token, a set of body
//! keywords, or a host pattern) with the scheme it suggests. New heuristics are new rows in
//! these tables, or entries in a JSON hints file, never new branches.

use serde::{Deserialize, Serialize};

use crate::scheme::{AuthScheme, Confidence};

/// What a rule looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "pattern")]
pub enum Matcher {
    /// A scheme token in a `WWW-Authenticate` challenge, compared case-insensitively.
    Challenge(String),
    /// Any of these keywords appearing in the response body, case-insensitively.
    BodyKeywords(Vec<String>),
    /// Exact host, or `*.suffix` for any subdomain of `suffix`.
    Host(String),
}

impl Matcher {
    /// Evaluation stage. Challenges first, then body, then host.
    pub(crate) fn stage(&self) -> u8 {
        match self {
            Matcher::Challenge(_) => 1,
            Matcher::BodyKeywords(_) => 2,
            Matcher::Host(_) => 3,
        }
    }

    fn default_confidence(&self) -> Confidence {
        match self {
            Matcher::Challenge(_) => Confidence::High,
            Matcher::BodyKeywords(_) | Matcher::Host(_) => Confidence::Medium,
        }
    }

    /// Returns the matched detail (token, keyword or host) when the rule fires.
    pub(crate) fn matches(
        &self,
        challenges: &[String],
        body_lower: &str,
        host: Option<&str>,
    ) -> Option<String> {
        match self {
            Matcher::Challenge(token) => challenges
                .iter()
                .find(|c| c.eq_ignore_ascii_case(token))
                .cloned(),
            Matcher::BodyKeywords(keywords) => keywords
                .iter()
                .find(|k| body_lower.contains(&k.to_lowercase()))
                .cloned(),
            Matcher::Host(pattern) => {
                let host = host?;
                host_matches(pattern, host).then(|| host.to_string())
            }
        }
    }
}

/// One row of the inference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeuristicRule {
    pub matcher: Matcher,
    pub scheme: AuthScheme,
    /// Defaults to High for challenges and Medium otherwise.
    #[serde(default)]
    pub confidence: Option<Confidence>,
    /// Short description shown to the user next to the candidate.
    pub evidence: String,
}

impl HeuristicRule {
    pub fn new(matcher: Matcher, scheme: AuthScheme, evidence: &str) -> Self {
        Self {
            matcher,
            scheme,
            confidence: None,
            evidence: evidence.to_string(),
        }
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
            .unwrap_or_else(|| self.matcher.default_confidence())
    }
}

const CHALLENGE_TOKENS: &[(&str, AuthScheme)] = &[
    ("basic", AuthScheme::Basic),
    ("bearer", AuthScheme::Bearer),
    ("apikey", AuthScheme::ApiKey),
    ("api-key", AuthScheme::ApiKey),
];

const BODY_KEYWORDS: &[(&[&str], AuthScheme, &str)] = &[
    (
        &["api_key", "apikey", "api key", "api-key"],
        AuthScheme::ApiKey,
        "response body mentions an API key",
    ),
    (
        &["bearer", "token", "jwt"],
        AuthScheme::Bearer,
        "response body mentions a token",
    ),
    (
        &["basic auth", "basic realm", "username and password"],
        AuthScheme::Basic,
        "response body mentions basic authentication",
    ),
    (
        &["signature", "custom header"],
        AuthScheme::Custom,
        "response body mentions a signed or custom header",
    ),
];

const KNOWN_HOSTS: &[(&str, AuthScheme)] = &[
    ("api.github.com", AuthScheme::Bearer),
    ("gitlab.com", AuthScheme::ApiKey),
    ("*.gitlab.com", AuthScheme::ApiKey),
    ("*.atlassian.net", AuthScheme::Basic),
    ("*.zendesk.com", AuthScheme::Basic),
    ("api.stripe.com", AuthScheme::Bearer),
    ("slack.com", AuthScheme::Bearer),
    ("api.openai.com", AuthScheme::Bearer),
    ("api.cloudflare.com", AuthScheme::Bearer),
    ("*.okta.com", AuthScheme::Custom),
];

/// The built-in rule table.
pub fn default_rules() -> Vec<HeuristicRule> {
    let challenges = CHALLENGE_TOKENS.iter().map(|(token, scheme)| {
        HeuristicRule::new(
            Matcher::Challenge(token.to_string()),
            *scheme,
            "WWW-Authenticate header",
        )
    });

    let keywords = BODY_KEYWORDS.iter().map(|(words, scheme, evidence)| {
        HeuristicRule::new(
            Matcher::BodyKeywords(words.iter().map(|w| w.to_string()).collect()),
            *scheme,
            evidence,
        )
    });

    let hosts = KNOWN_HOSTS.iter().map(|(pattern, scheme)| {
        HeuristicRule::new(
            Matcher::Host(pattern.to_string()),
            *scheme,
            "known service host",
        )
    });

    challenges.chain(keywords).chain(hosts).collect()
}

fn host_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();
    match pattern.strip_prefix("*.") {
        Some(suffix) => host
            .strip_suffix(suffix)
            .is_some_and(|rest| rest.ends_with('.')),
        None => host == pattern,
    }
}
