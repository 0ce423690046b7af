//! # HTTP Retrieval Utilities
//!
//! This module provides a robust, asynchronous API client wrapper around `reqwest`.
//! It includes middleware support for exponential backoff retries on transient
//! failures and standardized JSON response handling.
//!
//! Throttling (`429 Too Many Requests`) is never retried: the response is
//! returned to the caller as-is.

use std::time::Duration;

use reqwest::{header::HeaderMap, Method, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{
    default_on_request_failure, default_on_request_success, policies::ExponentialBackoff,
    RetryTransientMiddleware, Retryable, RetryableStrategy,
};
use serde::de::DeserializeOwned;
use url::Url;

/// A standardized container for API responses.
///
/// This struct wraps the deserialized data along with metadata about the
/// HTTP transaction, such as status codes and headers.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully deserialized response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The HTTP status code.
    pub status: StatusCode,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

/// Options used when building an [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ApiClientOptions {
    /// Per-request timeout, covering connect, send and body read.
    pub timeout: Duration,
    /// How many times a transient failure (5xx, connection reset, timeout) is retried.
    pub max_retries: u32,
}

impl Default for ApiClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

/// Retry classification that defers to the stock transient rules, except that
/// throttling responses are final.
struct ThrottleAwareStrategy;

impl RetryableStrategy for ThrottleAwareStrategy {
    fn handle(
        &self,
        res: &Result<reqwest::Response, reqwest_middleware::Error>,
    ) -> Option<Retryable> {
        match res {
            Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                Some(Retryable::Fatal)
            }
            Ok(response) => default_on_request_success(response),
            Err(error) => default_on_request_failure(error),
        }
    }
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles base URLs, query strings
/// and automatic retries.
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
}

impl ApiClient {
    /// Creates a new `ApiClient` instance with a retry policy.
    ///
    /// # Arguments
    /// * `base_url` - The absolute base URL for the API (e.g., "https://api.example.com/").
    /// * `options` - Timeout and retry settings.
    ///
    /// # Errors
    /// Fails if `base_url` is not an absolute URL or the TLS backend cannot be
    /// initialized.
    pub fn new(base_url: &str, options: &ApiClientOptions) -> anyhow::Result<Self> {
        // Parse the base URL to ensure it is valid and absolute
        let url = Url::parse(base_url)?;

        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(options.max_retries);

        let http = reqwest::Client::builder().timeout(options.timeout).build()?;

        // Construct the client with the retry middleware
        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy_and_strategy(
                retry_policy,
                ThrottleAwareStrategy,
            ))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
        })
    }

    /// Performs a generic HTTP request and handles the response.
    ///
    /// This method manages URL joining, query encoding, header injection and
    /// JSON deserialization of successful bodies.
    ///
    /// # Arguments
    /// * `method` - The HTTP verb (GET, POST, etc.).
    /// * `path` - The relative path to append to the base URL.
    /// * `query` - Query pairs, percent-encoded onto the URL.
    /// * `headers` - Optional additional headers for this specific request.
    ///
    /// # Errors
    /// Returns an `anyhow::Error` if URL joining, network execution, or
    /// decoding of a successful body fails.
    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        headers: Option<HeaderMap>,
    ) -> anyhow::Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
    {
        // 1. Construct the full absolute URL
        let mut full_url = self.base_url.join(path)?;
        if !query.is_empty() {
            full_url.query_pairs_mut().extend_pairs(query);
        }
        let mut req = self.inner.request(method, full_url);

        // 2. Add Custom Headers if provided
        if let Some(h) = headers {
            req = req.headers(h);
        }

        // 3. Execute the request and capture response metadata
        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();
        let success = status.is_success();

        // 4. Handle the result based on success status
        if success {
            let data = response.json::<T>().await?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status,
                success: true,
                headers: resp_headers,
            })
        } else {
            // Capture the error body as a string for debugging
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status,
                success: false,
                headers: resp_headers,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(max_retries: u32) -> ApiClientOptions {
        ApiClientOptions {
            timeout: Duration::from_secs(2),
            max_retries,
        }
    }

    #[test]
    fn test_new_rejects_relative_base_url() {
        assert!(ApiClient::new("not/a/url", &options(0)).is_err());
    }

    #[tokio::test]
    async fn test_request_joins_path_and_encodes_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/echo"))
            .and(query_param("cursor", "a b&c"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&format!("{}/", server.uri()), &options(0)).unwrap();
        let res = client
            .request::<serde_json::Value>(Method::GET, "v1/echo", &[("cursor", "a b&c")], None)
            .await
            .unwrap();

        assert!(res.success);
        assert_eq!(res.data.unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn test_throttling_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), &options(3)).unwrap();
        let res = client
            .request::<serde_json::Value>(Method::GET, "/", &[], None)
            .await
            .unwrap();

        assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
        assert!(!res.success);
        assert_eq!(res.headers.get("retry-after").unwrap(), "30");
    }

    #[tokio::test]
    async fn test_error_body_is_captured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), &options(0)).unwrap();
        let res = client
            .request::<serde_json::Value>(Method::GET, "/missing", &[], None)
            .await
            .unwrap();

        assert!(res.data.is_none());
        assert_eq!(res.error_body.as_deref(), Some("gone"));
    }
}
