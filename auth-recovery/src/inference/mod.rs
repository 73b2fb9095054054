//! Authentication scheme inference from a failed response.

mod rules;

pub use rules::{default_rules, HeuristicRule, Matcher};

use reqwest::header::{HeaderMap, WWW_AUTHENTICATE};
use url::Url;

use crate::scheme::{AuthScheme, Confidence, InferenceCandidate};

/// Proposes ranked candidate schemes for a response that failed authentication.
///
/// Rules run in stage order (challenge, body, host). A rule matching a scheme that already
/// has a candidate raises that candidate's confidence and appends its evidence instead of
/// adding a second entry. With no matches at all, every scheme is offered at `Low`.
#[derive(Debug, Clone)]
pub struct SchemeInferencer {
    rules: Vec<HeuristicRule>,
}

impl SchemeInferencer {
    /// Inferencer with the built-in rule table.
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(mut rules: Vec<HeuristicRule>) -> Self {
        rules.sort_by_key(|rule| rule.matcher.stage());
        Self { rules }
    }

    /// Append rules (e.g. from a hints file). They are evaluated within their stage
    /// after the rules already present.
    pub fn extend(mut self, extra: Vec<HeuristicRule>) -> Self {
        self.rules.extend(extra);
        self.rules.sort_by_key(|rule| rule.matcher.stage());
        self
    }

    pub fn rules(&self) -> &[HeuristicRule] {
        &self.rules
    }

    /// Rank candidate schemes, highest confidence first.
    pub fn infer(&self, headers: &HeaderMap, body: &str, url: &Url) -> Vec<InferenceCandidate> {
        let challenges = challenge_tokens(headers);
        let body_lower = body.to_lowercase();
        let host = url.host_str();

        let mut candidates: Vec<InferenceCandidate> = Vec::new();
        for rule in &self.rules {
            let Some(detail) = rule.matcher.matches(&challenges, &body_lower, host) else {
                continue;
            };
            let evidence = format!("{}: {}", rule.evidence, detail);
            let confidence = rule.confidence();

            match candidates.iter_mut().find(|c| c.scheme == rule.scheme) {
                Some(existing) => {
                    existing.confidence = existing.confidence.max(confidence);
                    if !existing.evidence.contains(&evidence) {
                        existing.evidence.push(evidence);
                    }
                }
                None => {
                    let mut candidate = InferenceCandidate::new(rule.scheme, confidence);
                    candidate.evidence.push(evidence);
                    candidates.push(candidate);
                }
            }
        }

        if candidates.is_empty() {
            return fallback_candidates();
        }

        candidates.sort_by(|a, b| b.confidence.cmp(&a.confidence));
        candidates
    }
}

impl Default for SchemeInferencer {
    fn default() -> Self {
        Self::new()
    }
}

/// Every scheme at `Low`, in menu order.
pub fn fallback_candidates() -> Vec<InferenceCandidate> {
    AuthScheme::MENU_ORDER
        .iter()
        .map(|scheme| InferenceCandidate {
            scheme: *scheme,
            confidence: Confidence::Low,
            evidence: vec!["no evidence, choose manually".to_string()],
        })
        .collect()
}

/// Scheme tokens from every `WWW-Authenticate` header.
///
/// A challenge list looks like `Bearer realm="api", error="invalid_token", Basic realm="x"`.
/// Each comma separated item whose first word has no `=` starts a new challenge.
/// Commas inside quoted parameter values do not separate items.
fn challenge_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(split_unquoted_commas)
        .filter_map(|item| item.split_whitespace().next())
        .filter(|word| !word.contains('=') && !word.contains('"'))
        .map(|word| word.to_string())
        .collect()
}

fn split_unquoted_commas(value: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                items.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&value[start..]);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    fn with_challenge(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_bearer_challenge_is_top_candidate_with_high_confidence() {
        let inferencer = SchemeInferencer::new();
        let candidates = inferencer.infer(
            &with_challenge("Bearer"),
            "",
            &url("https://api.example.com/data"),
        );

        assert_eq!(candidates[0].scheme, AuthScheme::Bearer);
        assert_eq!(candidates[0].confidence, Confidence::High);
    }

    #[test]
    fn test_api_key_body_keyword_without_challenge() {
        let inferencer = SchemeInferencer::new();
        let candidates = inferencer.infer(
            &HeaderMap::new(),
            r#"{"error": "apiKey required"}"#,
            &url("https://api.example.com/data"),
        );

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].scheme, AuthScheme::ApiKey);
        assert_eq!(candidates[0].confidence, Confidence::Medium);
        assert!(candidates[0].evidence[0].contains("apikey"));
    }

    #[test]
    fn test_challenge_with_parameters_and_multiple_schemes() {
        let inferencer = SchemeInferencer::new();
        let candidates = inferencer.infer(
            &with_challenge(r#"Basic realm="mgmt, primary", Bearer error="invalid_token""#),
            "",
            &url("https://mgmt.local/api"),
        );

        let schemes: Vec<AuthScheme> = candidates.iter().map(|c| c.scheme).collect();
        assert_eq!(schemes, vec![AuthScheme::Basic, AuthScheme::Bearer]);
        assert!(candidates.iter().all(|c| c.confidence == Confidence::High));
    }

    #[test]
    fn test_later_stage_merges_into_existing_candidate() {
        let inferencer = SchemeInferencer::new();
        let candidates = inferencer.infer(
            &with_challenge("Bearer"),
            "invalid bearer token",
            &url("https://api.github.com/user"),
        );

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].scheme, AuthScheme::Bearer);
        assert_eq!(candidates[0].confidence, Confidence::High);
        assert_eq!(candidates[0].evidence.len(), 3);
    }

    #[test]
    fn test_comma_inside_quoted_realm_does_not_start_a_challenge() {
        let headers = with_challenge(r#"Basic realm="a, Bearer b", charset="UTF-8""#);
        assert_eq!(challenge_tokens(&headers), vec!["Basic".to_string()]);

        let escaped = with_challenge(r#"Basic realm="say \", Bearer x", Bearer error="invalid""#);
        assert_eq!(
            challenge_tokens(&escaped),
            vec!["Basic".to_string(), "Bearer".to_string()]
        );
    }

    #[test]
    fn test_known_host_hint() {
        let inferencer = SchemeInferencer::new();
        let candidates = inferencer.infer(
            &HeaderMap::new(),
            "",
            &url("https://acme.atlassian.net/rest/api/2/issue"),
        );

        assert_eq!(candidates[0].scheme, AuthScheme::Basic);
        assert_eq!(candidates[0].confidence, Confidence::Medium);
    }

    #[test]
    fn test_high_confidence_sorts_ahead_of_medium() {
        let inferencer = SchemeInferencer::new();
        let candidates = inferencer.infer(
            &with_challenge("Basic"),
            "missing api_key",
            &url("https://mgmt.local/api"),
        );

        assert_eq!(candidates[0].scheme, AuthScheme::Basic);
        assert_eq!(candidates[1].scheme, AuthScheme::ApiKey);
    }

    #[test]
    fn test_generic_body_gives_all_schemes_at_low() {
        let inferencer = SchemeInferencer::new();
        let candidates = inferencer.infer(
            &HeaderMap::new(),
            "Unauthorized: invalid credentials",
            &url("https://mgmt.local/api"),
        );

        let schemes: Vec<AuthScheme> = candidates.iter().map(|c| c.scheme).collect();
        assert_eq!(schemes, AuthScheme::MENU_ORDER.to_vec());
        assert!(candidates.iter().all(|c| c.confidence == Confidence::Low));
    }

    #[test]
    fn test_unrecognized_challenge_falls_through() {
        let inferencer = SchemeInferencer::new();
        let candidates = inferencer.infer(
            &with_challenge(r#"Negotiate"#),
            "",
            &url("https://mgmt.local/api"),
        );
        assert_eq!(candidates.len(), 4);
    }

    #[test]
    fn test_extra_rules_extend_the_table() {
        let inferencer = SchemeInferencer::new().extend(vec![HeuristicRule::new(
            Matcher::Host("fmg.corp.example".to_string()),
            AuthScheme::ApiKey,
            "corporate manager",
        )]);
        let candidates = inferencer.infer(
            &HeaderMap::new(),
            "",
            &url("https://fmg.corp.example/jsonrpc"),
        );

        assert_eq!(candidates[0].scheme, AuthScheme::ApiKey);
        assert_eq!(candidates[0].evidence, vec!["corporate manager: fmg.corp.example"]);
    }
}
