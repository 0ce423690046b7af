//! # Games Servers Listing Client
//!
//! HTTP JSON implementation of [`ListingSource`] for the public servers
//! endpoint of a game universe:
//!
//! `GET {base}/v1/games/{universe_id}/servers/Public?sortOrder=Asc&limit={n}[&cursor=…]`
//!
//! ## Key Features:
//! - **Browser-mimicking headers**: every request carries the headers a web
//!   client would send, with a user agent drawn at random from a small pool.
//!   This spreads requests across fingerprints and lowers the odds of being
//!   throttled.
//! - **Throttle detection**: `429` is reported as [`PageError::RateLimited`],
//!   together with the `Retry-After` hint when the upstream provides one.
//! - **Per-page timeout and transient retries** come from the underlying
//!   [`ApiClient`].

use std::time::Duration;

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ListingPage, ListingSource, PageError, RawServerEntry};
use crate::retrieve::ky_http::{ApiClient, ApiClientOptions};

/// Default upstream host.
pub const DEFAULT_BASE_URL: &str = "https://games.roblox.com/";

/// Longest `Retry-After` hint taken at face value.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60 * 60);

/// User agents rotated across requests.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
];

/// Connection settings for [`GamesApiSource`].
#[derive(Debug, Clone)]
pub struct GamesApiOptions {
    /// Absolute base URL of the games API.
    pub base_url: String,
    /// Universe whose public servers are listed.
    pub universe_id: String,
    /// Per-page network timeout.
    pub page_timeout: Duration,
    /// Transient-failure retries per page (throttling is never retried).
    pub max_retries: u32,
}

impl Default for GamesApiOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            universe_id: "109983668079237".to_string(),
            page_timeout: Duration::from_secs(8),
            max_retries: 2,
        }
    }
}

/// Wire shape of one listing page.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerPage {
    #[serde(default)]
    data: Vec<RawServerEntry>,
    #[serde(default)]
    next_page_cursor: Option<String>,
}

/// Listing source backed by the public games servers endpoint.
pub struct GamesApiSource {
    client: ApiClient,
    path: String,
    page_timeout: Duration,
}

impl GamesApiSource {
    /// Builds the source and its HTTP client.
    ///
    /// # Errors
    /// Fails when the base URL is invalid or the HTTP client cannot be built.
    pub fn new(options: &GamesApiOptions) -> anyhow::Result<Self> {
        let mut base = options.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }

        let client = ApiClient::new(
            &base,
            &ApiClientOptions {
                timeout: options.page_timeout,
                max_retries: options.max_retries,
            },
        )?;

        Ok(Self {
            client,
            path: format!("v1/games/{}/servers/Public", options.universe_id),
            page_timeout: options.page_timeout,
        })
    }

    /// Browser-like request headers with a randomly chosen user agent.
    fn listing_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();

        let header_list = [
            ("accept", "application/json, text/plain, */*"),
            ("accept-language", "en-US,en;q=0.9"),
            ("cache-control", "no-cache"),
            ("pragma", "no-cache"),
            ("connection", "keep-alive"),
            ("referer", "https://www.roblox.com/"),
            ("origin", "https://www.roblox.com"),
            ("dnt", "1"),
        ];

        for (name, value) in header_list {
            if let (Ok(h_name), Ok(h_value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(h_name, h_value);
            }
        }

        if let Some(agent) = USER_AGENTS.choose(&mut rand::rng()) {
            if let Ok(value) = HeaderValue::from_str(agent) {
                headers.insert(USER_AGENT, value);
            }
        }

        headers
    }
}

/// Reads `Retry-After` when it is expressed in seconds, capped at [`MAX_RETRY_AFTER`].
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

fn classify_client_error(err: anyhow::Error) -> PageError {
    let is_decode = err
        .downcast_ref::<reqwest::Error>()
        .is_some_and(|e| e.is_decode());
    if is_decode {
        PageError::Decode(err.to_string())
    } else {
        PageError::Transport(err.to_string())
    }
}

#[async_trait]
impl ListingSource for GamesApiSource {
    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ListingPage, PageError> {
        let limit = page_size.to_string();
        let mut query = vec![("sortOrder", "Asc"), ("limit", limit.as_str())];
        if let Some(c) = cursor {
            query.push(("cursor", c));
        }

        debug!(path = %self.path, cursor = ?cursor, "requesting listing page");

        // The budget covers every retry attempt of this page.
        let request = self.client.request::<ServerPage>(
            Method::GET,
            &self.path,
            &query,
            Some(Self::listing_headers()),
        );
        let response = tokio::time::timeout(self.page_timeout, request)
            .await
            .map_err(|_| {
                warn!(timeout = ?self.page_timeout, "listing page timed out");
                PageError::Transport(format!("page timed out after {:?}", self.page_timeout))
            })?
            .map_err(classify_client_error)?;

        if response.status == StatusCode::TOO_MANY_REQUESTS {
            let hint = retry_after(&response.headers);
            warn!(retry_after = ?hint, "listing endpoint throttled the request");
            return Err(PageError::RateLimited { retry_after: hint });
        }

        if !response.success {
            return Err(PageError::Transport(format!(
                "HTTP {} for {}: {}",
                response.status,
                self.path,
                response.error_body.unwrap_or_default()
            )));
        }

        let page = response
            .data
            .ok_or_else(|| PageError::Decode("empty body on success".to_string()))?;

        Ok(ListingPage {
            entries: page.data,
            next_cursor: page.next_page_cursor.filter(|c| !c.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    async fn source_for(server: &MockServer) -> GamesApiSource {
        GamesApiSource::new(&GamesApiOptions {
            base_url: server.uri(),
            universe_id: "777".to_string(),
            page_timeout: Duration::from_secs(2),
            max_retries: 0,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_page_is_parsed_and_cursor_read() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/games/777/servers/Public"))
            .and(query_param("sortOrder", "Asc"))
            .and(query_param("limit", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "previousPageCursor": null,
                "nextPageCursor": "abc",
                "data": [
                    {"id": "s-1", "playing": 8, "maxPlayers": 10, "fps": 59.9},
                    {"id": "s-2", "playing": 2}
                ]
            })))
            .mount(&server)
            .await;

        let page = source_for(&server).await.fetch_page(None, 100).await.unwrap();

        assert_eq!(page.next_cursor.as_deref(), Some("abc"));
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].max_players, Some(10));
        assert_eq!(page.entries[1].max_players, None);
    }

    #[tokio::test]
    async fn test_cursor_is_forwarded_and_empty_cursor_ends_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("cursor", "next+token=="))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "nextPageCursor": "",
                "data": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = source_for(&server)
            .await
            .fetch_page(Some("next+token=="), 25)
            .await
            .unwrap();

        assert!(page.entries.is_empty());
        assert_eq!(page.next_cursor, None);
    }

    #[tokio::test]
    async fn test_throttle_maps_to_rate_limited_with_hint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "90"))
            .mount(&server)
            .await;

        let err = source_for(&server).await.fetch_page(None, 100).await.unwrap_err();
        match err {
            PageError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(90)))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_absurd_retry_after_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("Retry-After", "10000000000000000000"),
            )
            .mount(&server)
            .await;

        let err = source_for(&server).await.fetch_page(None, 100).await.unwrap_err();
        match err {
            PageError::RateLimited { retry_after } => assert_eq!(retry_after, Some(MAX_RETRY_AFTER)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_page_times_out_across_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": []}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let source = GamesApiSource::new(&GamesApiOptions {
            base_url: server.uri(),
            universe_id: "777".to_string(),
            page_timeout: Duration::from_millis(300),
            max_retries: 3,
        })
        .unwrap();

        let started = std::time::Instant::now();
        let err = source.fetch_page(None, 100).await.unwrap_err();

        assert!(matches!(err, PageError::Transport(_)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = source_for(&server).await.fetch_page(None, 100).await.unwrap_err();
        assert!(matches!(err, PageError::Transport(_)));
    }

    #[tokio::test]
    async fn test_garbage_body_maps_to_decode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let err = source_for(&server).await.fetch_page(None, 100).await.unwrap_err();
        assert!(matches!(err, PageError::Decode(_)));
    }

    #[tokio::test]
    async fn test_requests_carry_a_pooled_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(|req: &Request| {
                req.headers
                    .get("user-agent")
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|ua| USER_AGENTS.contains(&ua))
            })
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        source_for(&server).await.fetch_page(None, 10).await.unwrap();
    }
}
