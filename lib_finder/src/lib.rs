//! # lib_finder
//!
//! Discovery cache engine for paginated public server listings. Modules are
//! gated by folder so consumers only compile what they use.

// Declare the modules to re-export
#[cfg(feature = "retrieve")]
pub mod retrieve;
#[cfg(feature = "listing")]
pub mod listing;
#[cfg(feature = "discovery")]
pub mod discovery;

// Re-export the everyday entry points
#[cfg(feature = "listing")]
pub use listing::{GamesApiOptions, GamesApiSource, ListingSource};
#[cfg(feature = "discovery")]
pub use discovery::{CacheStatus, DiscoveryConfig, RefreshCoordinator, ServerRecord, ServersView};
