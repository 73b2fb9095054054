//! HTTP transport: client building with middleware and request execution.

mod client;
mod executor;
mod retry;

pub use client::{HttpClientBuilder, MiddlewareClient};
pub use executor::{ApiRequest, ApiResponse, HttpExecutor, RequestExecutor};
pub use retry::TransientRetryPolicy;
