//! Endpoint identity: the key for retry ledger and credential records.
//!
//! An endpoint is `scheme://host:port`. Paths, queries and credentials in the URL are
//! dropped so every path of one service shares a single lockout budget.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::error::{request_error, Error, ErrorKind, RequestErrorKind};

/// Normalized identity of a remote API instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    scheme: String,
    host: String,
    port: u16,
}

impl Endpoint {
    /// Derive the endpoint from a parsed URL.
    pub fn from_url(url: &Url) -> Result<Self, Error> {
        let host = url.host_str().ok_or_else(|| {
            request_error(
                RequestErrorKind::InvalidEndpoint,
                &format!("URL has no host: {url}"),
            )
        })?;
        let port = url.port_or_known_default().ok_or_else(|| {
            request_error(
                RequestErrorKind::InvalidEndpoint,
                &format!("URL has no port and no known default: {url}"),
            )
        })?;

        Ok(Self {
            scheme: url.scheme().to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            port,
        })
    }

    /// Parse a URL string (any path is ignored) into an endpoint.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let url = Url::parse(input.trim()).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Request(RequestErrorKind::InvalidEndpoint),
        })?;
        Self::from_url(&url)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Endpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Endpoint::parse(&raw).map_err(serde::de::Error::custom)
    }
}
