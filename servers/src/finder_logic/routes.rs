use crate::finder_logic::model::{ErrorResponse, JobsResponse, RefreshResponse};
use crate::finder_logic::state::AppState;
use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const API_KEY_HEADER: &str = "x-api-key";

const BANNER: &str = "Public server finder is online (key-protected, cached).";

#[derive(Debug, Default, Deserialize)]
struct KeyParams {
    key: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let guarded = Router::new()
        .route("/get_jobs", get(jobs_handler))
        .route("/status", get(status_handler))
        .route("/refresh", post(refresh_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), api_key_middleware));

    Router::new()
        .route("/", get(home_handler))
        .merge(guarded)
        .with_state(state)
}

/// Binds the listening socket on all interfaces.
pub async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Finder server listening on {}", addr);
    Ok(listener)
}

/// Serves the router until the shutdown guard fires.
pub async fn run(
    listener: TcpListener,
    state: AppState,
    shutdown_guard: tokio_graceful::ShutdownGuard,
) -> anyhow::Result<()> {
    let app = router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_guard.cancelled().await;
            info!("Finder server shutting down.");
        })
        .await?;
    Ok(())
}

/// Accepts the key from `?key=` first, then from the `X-API-Key` header.
async fn api_key_middleware(
    State(state): State<AppState>,
    Query(params): Query<KeyParams>,
    request: Request,
    next: Next,
) -> Response {
    let header_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    let presented = params.key.as_deref().or(header_key);

    if state.key_matches(presented) {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "rejected request with a missing or invalid API key");
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse::new("Invalid or missing API key.")),
    )
        .into_response()
}

async fn home_handler() -> &'static str {
    BANNER
}

async fn jobs_handler(State(state): State<AppState>) -> Json<JobsResponse> {
    let response = JobsResponse::from(state.engine.get_servers().await);
    info!(
        status = ?response.status,
        servers = response.servers_loaded,
        cache_age = ?response.cache_age_seconds,
        "served server list"
    );
    Json(response)
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.status())
}

async fn refresh_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.engine.force_refresh() {
        (
            StatusCode::ACCEPTED,
            Json(RefreshResponse {
                status: "started",
                launched: true,
            }),
        )
    } else {
        (
            StatusCode::CONFLICT,
            Json(RefreshResponse {
                status: "in_progress",
                launched: false,
            }),
        )
    }
}
