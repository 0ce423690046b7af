//! # Cache Store
//!
//! Holds the last known good result set. The current snapshot sits behind an
//! `ArcSwap`: readers load an `Arc` without taking any lock, the single writer
//! swaps in a fully built replacement. A reader therefore sees either the old
//! or the new snapshot, never a mix.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use super::filter::ServerRecord;

/// Immutable, fully formed copy of the cached record set.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    records: Vec<ServerRecord>,
    created_at: Option<Instant>,
    fetched_at: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
    /// Records in upstream order.
    pub fn records(&self) -> &[ServerRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True for the initial placeholder snapshot.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Age at `now`, `None` for the initial placeholder.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.created_at
            .map(|created| now.saturating_duration_since(created))
    }

    /// Wall-clock time the snapshot was installed.
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }
}

/// Shared holder of the current [`CacheSnapshot`].
#[derive(Debug)]
pub struct CacheStore {
    current: ArcSwap<CacheSnapshot>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    /// Starts with an empty snapshot.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(CacheSnapshot::default()),
        }
    }

    /// Installs `records` as the new snapshot.
    ///
    /// An empty set is refused and the current snapshot stays in place:
    /// stale data beats no data. Returns whether a replacement happened.
    pub fn replace(&self, records: Vec<ServerRecord>) -> bool {
        if records.is_empty() {
            return false;
        }
        self.current.store(Arc::new(CacheSnapshot {
            records,
            created_at: Some(Instant::now()),
            fetched_at: Some(Utc::now()),
        }));
        true
    }

    /// The most recently installed snapshot. Never blocks.
    pub fn read(&self) -> Arc<CacheSnapshot> {
        self.current.load_full()
    }

    /// Whether any snapshot was ever installed.
    pub fn is_populated(&self) -> bool {
        self.current.load().created_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, playing: u32) -> ServerRecord {
        ServerRecord {
            id: id.to_string(),
            playing,
            max_players: None,
        }
    }

    #[test]
    fn test_initial_snapshot_is_empty_and_ageless() {
        let store = CacheStore::new();
        let snap = store.read();
        assert!(snap.is_empty());
        assert_eq!(snap.age(Instant::now()), None);
        assert!(!store.is_populated());
    }

    #[test]
    fn test_empty_replacement_is_refused() {
        let store = CacheStore::new();
        assert!(store.replace(vec![record("a", 9)]));
        assert!(!store.replace(Vec::new()));

        let snap = store.read();
        assert_eq!(snap.records(), &[record("a", 9)]);
    }

    #[test]
    fn test_old_readers_keep_their_snapshot() {
        let store = CacheStore::new();
        store.replace(vec![record("a", 9)]);
        let before = store.read();

        store.replace(vec![record("b", 8), record("c", 7)]);

        assert_eq!(before.len(), 1);
        assert_eq!(store.read().len(), 2);
        assert!(store.read().fetched_at().is_some());
    }
}
