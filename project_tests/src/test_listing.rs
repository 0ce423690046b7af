//! # Live Listing Smoke Test
//!
//! Drives the discovery engine against the real public servers endpoint and
//! prints what a caller of `/get_jobs` would see. Not part of `cargo test`.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use lib_finder::discovery::{CacheStatus, DiscoveryConfig, RefreshCoordinator};
use lib_finder::listing::{GamesApiOptions, GamesApiSource};
use tracing_subscriber::EnvFilter;

/// Command line for the smoke run.
#[derive(Parser, Debug)]
#[clap(about = "Fetch the live public server listing once through the discovery engine")]
struct Args {
    /// Universe to list.
    #[clap(long, default_value = "109983668079237")]
    universe_id: String,

    /// Minimum occupant count.
    #[clap(long, default_value_t = 7)]
    min_players: u32,

    /// Seconds to wait for the first sweep.
    #[clap(long, default_value_t = 60)]
    wait_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // // Statement: Console logging only, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let source = GamesApiSource::new(&GamesApiOptions {
        universe_id: args.universe_id.clone(),
        ..GamesApiOptions::default()
    })?;
    let engine = RefreshCoordinator::new(
        Arc::new(source),
        DiscoveryConfig {
            min_players: args.min_players,
            first_call_wait: Duration::from_secs(args.wait_secs),
            ..DiscoveryConfig::default()
        },
    );

    println!("[*] Sweeping universe {} (min players {})...", args.universe_id, args.min_players);
    let view = engine.get_servers().await;

    println!("\n[RESULT] status={:?} servers={}", view.status, view.records.len());
    println!("-----------------------------------------------");
    for record in view.records.iter().take(10) {
        println!("{}", serde_json::to_string(record)?);
    }
    println!("-----------------------------------------------");
    println!("{}", serde_json::to_string_pretty(&engine.status())?);

    if view.status != CacheStatus::Fresh {
        eprintln!("\n[WARN] The first sweep did not fill the cache in time.");
        std::process::exit(1);
    }
    Ok(())
}
