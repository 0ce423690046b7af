//! # Upstream Listing Source
//!
//! The discovery engine never talks HTTP directly. It walks the upstream
//! listing through the [`ListingSource`] trait, which hands back one page of
//! raw entries plus an optional cursor for the next page, a throttling signal,
//! or a failure.
//!
//! ## Contained Modules:
//!
//! - **`games_api`**: The HTTP JSON implementation against the public games
//!   servers endpoint, with browser-mimicking headers and a rotating user agent.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// HTTP JSON listing source for the public games servers endpoint.
pub mod games_api;

pub use games_api::{GamesApiOptions, GamesApiSource};

/// One raw entry of an upstream page, before filtering.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawServerEntry {
    /// Opaque server identifier. Numbers are accepted and kept in textual form.
    #[serde(deserialize_with = "deserialize_opaque_id")]
    pub id: String,
    /// Current occupant count. Missing counts are read as zero.
    #[serde(default)]
    pub playing: u32,
    /// Capacity, when the upstream reports one.
    #[serde(default)]
    pub max_players: Option<u32>,
}

/// A single page returned by a [`ListingSource`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Raw entries of this page, in upstream order.
    pub entries: Vec<RawServerEntry>,
    /// Cursor for the following page. `None` (or an empty string) ends pagination.
    pub next_cursor: Option<String>,
}

/// Failure modes of a page retrieval.
#[derive(Debug, Error)]
pub enum PageError {
    /// The upstream explicitly throttled us.
    #[error("upstream rate limited the request (retry after {retry_after:?})")]
    RateLimited {
        /// Server-provided hint on how long to stay away, if any.
        retry_after: Option<Duration>,
    },
    /// Network, timeout or non-success HTTP status.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The upstream answered but the payload did not match the expected shape.
    #[error("malformed listing payload: {0}")]
    Decode(String),
}

/// Capability to retrieve one page of the upstream listing.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetches the page identified by `cursor` (the first page when `None`).
    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ListingPage, PageError>;
}

fn deserialize_opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "server id must be a string or a number, got {}",
            other
        ))),
    }
}
