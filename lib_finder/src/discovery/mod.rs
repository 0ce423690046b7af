//! # Discovery Engine Module
//!
//! A background-refreshed cache over a paginated, rate-limited upstream
//! listing. Callers always get an answer from memory; the upstream is walked
//! at most once at a time and never faster than the backoff allows.
//!
//! ## Core Components:
//!
//! - **`filter`**: Keeps servers at or above the occupancy threshold and
//!   projects them to the stored record shape.
//!
//! - **`fetcher`**: Walks the listing page by page with a randomized pause
//!   between pages and reports why it stopped, along with any partial results.
//!
//! - **`backoff`**: The `Idle` / `InFlight` / `Cooldown` state machine. Its
//!   atomic claim is what makes refreshes single-flight.
//!
//! - **`store`**: The last known good snapshot, swapped atomically and never
//!   replaced by an empty set.
//!
//! - **`coordinator`**: The public face. Triggers refreshes, waits briefly on
//!   the very first read, and labels every answer with its freshness.
//!
//! ## Workflow:
//! 1.  A caller asks the [`RefreshCoordinator`] for servers.
//! 2.  If the backoff allows it, the caller claims `InFlight` and a sweep is
//!     spawned in the background.
//! 3.  The caller reads the current snapshot immediately, shuffled.
//! 4.  The sweep finishes, installs a non-empty result and sets the cooldown.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Fetch state machine and cooldown bookkeeping.
pub mod backoff;
/// Engine tuning knobs.
pub mod config;
/// Public entry point tying fetcher, backoff and store together.
pub mod coordinator;
/// Page walker over a listing source.
pub mod fetcher;
/// Occupancy threshold filter and the stored record type.
pub mod filter;
/// Atomically swapped snapshot holder.
pub mod store;

// --- Public API Re-exports ---
pub use backoff::{BackoffStateMachine, FetchState, FetchVerdict};
pub use config::DiscoveryConfig;
pub use coordinator::{CacheStatus, EngineStatus, RefreshCoordinator, ServersView, StateLabel};
pub use fetcher::{FetchOutcome, PaginatedFetcher, Termination};
pub use filter::{RecordFilter, ServerRecord};
pub use store::{CacheSnapshot, CacheStore};
