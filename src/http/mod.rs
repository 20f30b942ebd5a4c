//! HTTP client with retry, rate limiting, and response classification
//!
//! Every list request goes through `HttpClient::request_classified`, which
//! interprets responses through a `ResponseValidator` so that retriable
//! failures back off, fatal failures abort the partition, and the upstream
//! "no items found" 400 terminates pagination cleanly.

mod classify;
mod client;
mod rate_limit;

pub use classify::{FailureClassifier, ResponseOutcome, ResponseValidator, NO_ITEMS_FOUND};
pub use client::{ApiPage, HttpClient, HttpClientConfig, HttpClientConfigBuilder, RequestConfig};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
