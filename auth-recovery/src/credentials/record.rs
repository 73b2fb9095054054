//! Credential records and how they are applied to requests.

use std::collections::BTreeMap;
use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::endpoint::Endpoint;
use crate::error::{credential_error, CredentialErrorKind, Error};
use crate::scheme::AuthScheme;

/// Header that carries an API key when none is named.
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// Named secret values referenced from header templates as `{name}`.
pub type Secrets = BTreeMap<String, SecretString>;

/// One header to set, with a value template such as `Bearer {token}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderAssignment {
    pub name: String,
    pub template: String,
}

impl HeaderAssignment {
    pub fn new(name: &str, template: &str) -> Self {
        Self {
            name: name.to_string(),
            template: template.to_string(),
        }
    }
}

/// Opaque handle under which a store files the secret material of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretRef(Uuid);

impl SecretRef {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A credential collected from the user but not yet bound to an endpoint.
#[derive(Debug, Clone)]
pub struct CredentialDraft {
    pub scheme: AuthScheme,
    pub header_assignments: Vec<HeaderAssignment>,
    pub secrets: Secrets,
}

impl CredentialDraft {
    /// Key sent verbatim in `header_name`.
    pub fn api_key(header_name: &str, key: SecretString) -> Self {
        Self {
            scheme: AuthScheme::ApiKey,
            header_assignments: vec![HeaderAssignment::new(header_name, "{api_key}")],
            secrets: Secrets::from([("api_key".to_string(), key)]),
        }
    }

    /// `Authorization: Bearer <token>`.
    pub fn bearer(token: SecretString) -> Self {
        Self {
            scheme: AuthScheme::Bearer,
            header_assignments: vec![HeaderAssignment::new(
                AUTHORIZATION.as_str(),
                "Bearer {token}",
            )],
            secrets: Secrets::from([("token".to_string(), token)]),
        }
    }

    /// `Authorization: Basic base64(username:password)`.
    pub fn basic(username: &str, password: SecretString) -> Self {
        let encoded = BASE64.encode(format!("{}:{}", username, password.expose_secret()));
        Self {
            scheme: AuthScheme::Basic,
            header_assignments: vec![HeaderAssignment::new(
                AUTHORIZATION.as_str(),
                "Basic {basic}",
            )],
            secrets: Secrets::from([("basic".to_string(), SecretString::new(encoded))]),
        }
    }

    /// Arbitrary headers, each value held as a secret named after its header.
    pub fn custom(headers: Vec<(String, SecretString)>) -> Self {
        let mut header_assignments = Vec::with_capacity(headers.len());
        let mut secrets = Secrets::new();
        for (name, value) in headers {
            let placeholder = name.trim().to_ascii_lowercase();
            header_assignments.push(HeaderAssignment::new(
                name.trim(),
                &format!("{{{placeholder}}}"),
            ));
            secrets.insert(placeholder, value);
        }
        Self {
            scheme: AuthScheme::Custom,
            header_assignments,
            secrets,
        }
    }

    /// Bind the draft to an endpoint. The record is not persisted yet.
    pub fn into_record(self, endpoint: &Endpoint) -> CredentialRecord {
        let now = Utc::now();
        CredentialRecord {
            endpoint: endpoint.clone(),
            scheme: self.scheme,
            header_assignments: self.header_assignments,
            secret_ref: SecretRef::generate(),
            created_at: now,
            updated_at: now,
            persisted: false,
            secrets: self.secrets,
        }
    }
}

/// How to authenticate against one endpoint.
///
/// Secret values are held as `SecretString` and only exposed while rendering header values,
/// which are then marked sensitive.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub endpoint: Endpoint,
    pub scheme: AuthScheme,
    pub header_assignments: Vec<HeaderAssignment>,
    pub secret_ref: SecretRef,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub persisted: bool,
    secrets: Secrets,
}

impl CredentialRecord {
    /// Rebuild a record from a store's representation.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        endpoint: Endpoint,
        scheme: AuthScheme,
        header_assignments: Vec<HeaderAssignment>,
        secret_ref: SecretRef,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        persisted: bool,
        secrets: Secrets,
    ) -> Self {
        Self {
            endpoint,
            scheme,
            header_assignments,
            secret_ref,
            created_at,
            updated_at,
            persisted,
            secrets,
        }
    }

    pub fn secrets(&self) -> &Secrets {
        &self.secrets
    }

    pub fn header_names(&self) -> Vec<String> {
        self.header_assignments
            .iter()
            .map(|a| a.name.clone())
            .collect()
    }

    /// Render every header template and set it on `headers`, replacing existing values.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<(), Error> {
        for assignment in &self.header_assignments {
            let name = HeaderName::from_bytes(assignment.name.as_bytes()).map_err(|_| {
                credential_error(
                    CredentialErrorKind::InvalidTemplate,
                    &format!("invalid header name {:?}", assignment.name),
                )
            })?;
            let rendered = render(&assignment.template, &self.secrets)?;
            let mut value = HeaderValue::from_str(&rendered).map_err(|_| {
                credential_error(
                    CredentialErrorKind::InvalidTemplate,
                    &format!("value for header {name} is not a valid header value"),
                )
            })?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }
        Ok(())
    }
}

fn render(template: &str, secrets: &Secrets) -> Result<String, Error> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| {
            credential_error(
                CredentialErrorKind::InvalidTemplate,
                "unterminated placeholder in header template",
            )
        })?;
        let name = &after[..end];
        let secret = secrets.get(name).ok_or_else(|| {
            credential_error(
                CredentialErrorKind::InvalidTemplate,
                &format!("unknown placeholder {{{name}}} in header template"),
            )
        })?;
        out.push_str(secret.expose_secret());
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
