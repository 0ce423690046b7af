use lib_finder::discovery::{CacheStatus, ServerRecord, ServersView};
use serde::Serialize;

/// Body of `GET /get_jobs`.
#[derive(Debug, Clone, Serialize)]
pub struct JobsResponse {
    pub status: CacheStatus,
    pub servers_loaded: usize,
    pub cooldown_seconds_remaining: u64,
    pub cache_age_seconds: Option<u64>,
    pub servers: Vec<ServerRecord>,
}

impl From<ServersView> for JobsResponse {
    fn from(view: ServersView) -> Self {
        Self {
            status: view.status,
            servers_loaded: view.records.len(),
            cooldown_seconds_remaining: view.cooldown_seconds_remaining,
            cache_age_seconds: view.cache_age_seconds,
            servers: view.records,
        }
    }
}

/// Body of `POST /refresh`.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshResponse {
    pub status: &'static str,
    pub launched: bool,
}

/// Error body shared by every guarded route.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
        }
    }
}
