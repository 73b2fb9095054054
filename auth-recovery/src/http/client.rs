//! HTTP client builder with middleware.

use std::time::Duration;

use reqwest_middleware::ClientBuilder;
use reqwest_retry::RetryTransientMiddleware;

use super::TransientRetryPolicy;

/// HTTP client configuration.
#[derive(Debug, Clone)]
struct HttpClientConfig {
    /// Request timeout. Expiry surfaces as a network error, never an auth failure.
    timeout: Duration,
    /// Retries for transient transport failures (not authentication failures).
    transient_retries: u32,
    user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            transient_retries: 0,
            user_agent: format!("restkit/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTP client with middleware.
pub type MiddlewareClient = reqwest_middleware::ClientWithMiddleware;

/// Builder for HTTP clients with transient-retry middleware.
///
/// The client carries no authentication of its own: credentials are applied per request
/// by the recovery orchestrator.
pub struct HttpClientBuilder {
    config: HttpClientConfig,
}

impl HttpClientBuilder {
    /// Create a new client builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: HttpClientConfig::default(),
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the maximum number of transient retries.
    pub fn with_transient_retries(mut self, transient_retries: u32) -> Self {
        self.config.transient_retries = transient_retries;
        self
    }

    /// Build the configured HTTP client.
    pub fn build(self) -> Result<MiddlewareClient, reqwest::Error> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(self.config.timeout)
            .user_agent(self.config.user_agent)
            .build()?;

        let retry_policy = TransientRetryPolicy::new(self.config.transient_retries);
        let client_with_middleware = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(client_with_middleware)
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default() {
        let builder = HttpClientBuilder::new();
        assert_eq!(builder.config.timeout, Duration::from_secs(30));
        assert_eq!(builder.config.transient_retries, 0);
        assert!(builder.config.user_agent.starts_with("restkit/"));
    }

    #[test]
    fn test_builder_with_timeout() {
        let builder = HttpClientBuilder::new().with_timeout(Duration::from_secs(60));
        assert_eq!(builder.config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_builder_with_transient_retries() {
        let builder = HttpClientBuilder::new().with_transient_retries(5);
        assert_eq!(builder.config.transient_retries, 5);
    }

    #[tokio::test]
    async fn test_build_client() {
        let result = HttpClientBuilder::new().build();
        assert!(result.is_ok());
    }
}
