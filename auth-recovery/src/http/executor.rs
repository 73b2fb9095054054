//! Request execution: one HTTP request in, status/headers/body out.

use async_trait::async_trait;
use log::*;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use url::Url;

use super::MiddlewareClient;
use crate::error::{request_error, Error, ErrorKind, RequestErrorKind};

/// A request as the caller built it. Recovery only ever adds or overwrites
/// authentication headers on a copy of it.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, url: &str) -> Result<Self, Error> {
        let url = Url::parse(url).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Request(RequestErrorKind::InvalidEndpoint),
        })?;
        Ok(Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        })
    }

    pub fn get(url: &str) -> Result<Self, Error> {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, Error> {
        let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Request(RequestErrorKind::InvalidHeader),
        })?;
        let value = HeaderValue::from_str(value.trim()).map_err(|_| {
            request_error(
                RequestErrorKind::InvalidHeader,
                &format!("invalid value for header {name}"),
            )
        })?;
        self.headers.append(name, value);
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success() || self.status.is_redirection()
    }
}

/// Issues a single HTTP request. Knows nothing about authentication.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Send the request. Transport failures are `Err`; any HTTP status is `Ok`.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error>;
}

/// `RequestExecutor` backed by a reqwest client with transient-retry middleware.
pub struct HttpExecutor {
    client: MiddlewareClient,
}

impl HttpExecutor {
    pub fn new(client: MiddlewareClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            warn!(
                "{} {}{} failed: {e}",
                request.method,
                request.url.origin().ascii_serialization(),
                request.url.path()
            );
            Error::from(e)
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        debug!(
            "{} {}{} -> {}",
            request.method,
            request.url.origin().ascii_serialization(),
            request.url.path(),
            status
        );

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpClientBuilder;
    use std::time::Duration;

    fn executor() -> HttpExecutor {
        HttpExecutor::new(HttpClientBuilder::new().build().unwrap())
    }

    #[tokio::test]
    async fn test_send_returns_status_headers_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/config")
            .match_header("x-trace", "abc")
            .match_body("{\"name\":\"edge\"}")
            .with_status(201)
            .with_header("x-request-id", "req-1")
            .with_body("created")
            .create_async()
            .await;

        let request = ApiRequest::new(Method::POST, &format!("{}/api/config", server.url()))
            .unwrap()
            .with_header("x-trace", "abc")
            .unwrap()
            .with_body("{\"name\":\"edge\"}");

        let response = executor().send(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.headers.get("x-request-id").unwrap(), "req-1");
        assert_eq!(response.body, "created");
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_auth_failure_is_a_response_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/data")
            .with_status(401)
            .create_async()
            .await;

        let request = ApiRequest::get(&format!("{}/data", server.url())).unwrap();
        let response = executor().send(&request).await.unwrap();

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_connection_refused_is_a_network_error() {
        let client = HttpClientBuilder::new()
            .with_timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        // Port 9 (discard) on localhost is closed in test environments.
        let request = ApiRequest::get("http://127.0.0.1:9/data").unwrap();
        let result = HttpExecutor::new(client).send(&request).await;

        assert!(matches!(
            result,
            Err(Error {
                error_kind: ErrorKind::Network(_),
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_header_name_is_rejected() {
        let result = ApiRequest::get("https://api.example.com")
            .unwrap()
            .with_header("bad header", "x");
        assert!(matches!(
            result,
            Err(Error {
                error_kind: ErrorKind::Request(RequestErrorKind::InvalidHeader),
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let result = ApiRequest::get("not a url");
        assert!(matches!(
            result,
            Err(Error {
                error_kind: ErrorKind::Request(RequestErrorKind::InvalidEndpoint),
                ..
            })
        ));
    }
}
