//! # Public Server Finder
//!
//! HTTP front end of the discovery engine. Serves a shuffled, cached list of
//! busy public servers without ever making a caller wait on the upstream.
//!
//! ## Key Features:
//! - **Layered Configuration**: defaults, an optional JSON file, then
//!   environment and CLI flags (`clap`). `.env` files are honoured.
//! - **Structured Logging**: console output plus a daily rolling JSON log file.
//! - **API Key Guard**: `?key=` or `X-API-Key` on every data route.
//! - **Graceful Shutdown**: `tokio-graceful` drains the server and the
//!   optional keep-warm task on Ctrl-C / SIGTERM.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_graceful::Shutdown;
use tracing::{error, info, warn};

use lib_finder::{GamesApiSource, RefreshCoordinator};

mod finder_logic;
use finder_logic::{config, logger, routes, state};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal
    let _ = dotenvy::dotenv();

    let config = config::load_config()?;
    let _log_guard = logger::setup_logging(&config.log_dir(), config.log_level())?;

    let upstream = config.games_api_options();
    let engine_config = config.discovery_config();
    info!(
        universe_id = %upstream.universe_id,
        base_url = %upstream.base_url,
        min_players = engine_config.min_players,
        page_size = engine_config.page_size,
        "starting discovery engine"
    );

    let source = GamesApiSource::new(&upstream)?;
    let keep_warm_period = engine_config.long_cooldown;
    let engine = RefreshCoordinator::new(Arc::new(source), engine_config);
    let app_state = state::AppState::new(engine.clone(), config.api_key());
    if app_state.is_open() {
        warn!("No API key configured (API_KEY or KEY): all routes are open.");
    }

    let listener = routes::bind(config.port()).await?;

    let shutdown: Shutdown = Shutdown::default();

    shutdown.spawn_task_fn(move |guard| async move {
        if let Err(e) = routes::run(listener, app_state, guard).await {
            error!("Finder server stopped with an error: {:#}", e);
        }
    });

    if config.prewarm() {
        info!(period_secs = keep_warm_period.as_secs(), "keep-warm refresh enabled");
        shutdown.spawn_task_fn(move |guard| async move {
            engine
                .keep_warm(keep_warm_period, async move {
                    guard.cancelled().await;
                })
                .await;
        });
    }

    match shutdown.shutdown_with_limit(Duration::from_secs(10)).await {
        Ok(elapsed) => {
            info!(
                "shutdown: gracefully {}s after shutdown signal received",
                elapsed.as_secs_f64()
            );
        }
        Err(e) => {
            warn!("shutdown: forcefully due to timeout: {}", e);
        }
    }

    Ok(())
}
