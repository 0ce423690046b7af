//! # Record Filter
//!
//! Decides whether a raw listing entry is worth keeping and projects it to the
//! stored [`ServerRecord`] shape.

use serde::Serialize;

use crate::listing::RawServerEntry;

/// A server that passed the occupancy threshold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    /// Opaque upstream identifier.
    pub id: String,
    /// Occupant count at fetch time.
    pub playing: u32,
    /// Capacity, absent when unknown.
    pub max_players: Option<u32>,
}

/// Occupancy threshold filter.
#[derive(Debug, Clone, Copy)]
pub struct RecordFilter {
    min_players: u32,
}

impl RecordFilter {
    /// Keeps entries with at least `min_players` occupants.
    pub fn new(min_players: u32) -> Self {
        Self { min_players }
    }

    /// Returns the projected record when `entry` qualifies.
    pub fn apply(&self, entry: &RawServerEntry) -> Option<ServerRecord> {
        (entry.playing >= self.min_players).then(|| ServerRecord {
            id: entry.id.clone(),
            playing: entry.playing,
            max_players: entry.max_players,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, playing: u32, max_players: Option<u32>) -> RawServerEntry {
        RawServerEntry {
            id: id.to_string(),
            playing,
            max_players,
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let filter = RecordFilter::new(7);
        assert!(filter.apply(&entry("a", 6, Some(10))).is_none());

        let kept = filter.apply(&entry("b", 7, Some(10))).unwrap();
        assert_eq!(kept.id, "b");
        assert_eq!(kept.playing, 7);
        assert_eq!(kept.max_players, Some(10));
    }

    #[test]
    fn test_zero_threshold_keeps_empty_servers() {
        let filter = RecordFilter::new(0);
        assert!(filter.apply(&entry("idle", 0, None)).is_some());
    }

    #[test]
    fn test_record_serializes_with_upstream_field_names() {
        let record = RecordFilter::new(1).apply(&entry("x", 3, None)).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"id": "x", "playing": 3, "maxPlayers": null}));
    }
}
