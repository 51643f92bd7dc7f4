//! # Source Working Set
//!
//! One source's current spots, keyed by `(station, band)` and kept in
//! insertion order. Streaming sources upsert one spot at a time and evict the
//! oldest entries past capacity; polling sources replace the whole set every
//! cycle.

use indexmap::IndexMap;
use std::sync::Arc;

use crate::spot::{Spot, SpotKey, SpotSource};

/// Cluster feed capacity.
pub const CLUSTER_CAPACITY: usize = 500;
/// Skimmer feed capacity.
pub const SKIMMER_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct WorkingSet {
    source: SpotSource,
    capacity: Option<usize>,
    spots: IndexMap<SpotKey, Spot>,
}

impl WorkingSet {
    /// Unbounded set (polled sources).
    pub fn new(source: SpotSource) -> Self {
        Self {
            source,
            capacity: None,
            spots: IndexMap::new(),
        }
    }

    pub fn with_capacity(source: SpotSource, capacity: usize) -> Self {
        Self {
            source,
            capacity: Some(capacity.max(1)),
            spots: IndexMap::with_capacity(capacity),
        }
    }

    pub fn source(&self) -> SpotSource {
        self.source
    }

    /// Inserts a spot. A spot for the same `(station, band)` is replaced and
    /// moves to the newest position. Returns `true` if the key was new.
    pub fn upsert(&mut self, spot: Spot) -> bool {
        let key = spot.key();
        // Remove first so a replaced spot lands at the end
        let replaced = self.spots.shift_remove(&key).is_some();
        self.spots.insert(key, spot);
        self.evict_overflow();
        !replaced
    }

    /// Replaces the whole set with a fresh fetch. On a key clash the most
    /// recently observed spot is kept; equal times go to the later entry.
    pub fn replace_all(&mut self, spots: impl IntoIterator<Item = Spot>) {
        self.spots.clear();
        for spot in spots {
            let key = spot.key();
            if let Some(existing) = self.spots.get(&key) {
                if existing.observed_at > spot.observed_at {
                    continue;
                }
            }
            self.spots.shift_remove(&key);
            self.spots.insert(key, spot);
        }
        self.evict_overflow();
    }

    fn evict_overflow(&mut self) {
        if let Some(capacity) = self.capacity {
            while self.spots.len() > capacity {
                self.spots.shift_remove_index(0);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    pub fn get(&self, key: &SpotKey) -> Option<&Spot> {
        self.spots.get(key)
    }

    pub fn clear(&mut self) {
        self.spots.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Spot> {
        self.spots.values()
    }

    /// Immutable snapshot, oldest first.
    pub fn snapshot(&self) -> Arc<Vec<Spot>> {
        Arc::new(self.spots.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn spot(call: &str, khz: f64) -> Spot {
        Spot::new(SpotSource::Cluster, call, khz, Utc::now())
    }

    #[test]
    fn test_one_spot_per_station_band() {
        let mut ws = WorkingSet::with_capacity(SpotSource::Cluster, 10);
        assert!(ws.upsert(spot("K1ABC", 14_025.0)));
        let mut later = spot("K1ABC", 14_030.0);
        later.observed_at = later.observed_at + Duration::seconds(30);
        assert!(!ws.upsert(later.clone()));
        assert!(ws.upsert(spot("K1ABC", 7_025.0)));

        assert_eq!(ws.len(), 2);
        let kept = ws.get(&later.key()).unwrap();
        assert_eq!(kept.frequency_khz, 14_030.0);
    }

    #[test]
    fn test_replaced_spot_moves_to_newest() {
        let mut ws = WorkingSet::with_capacity(SpotSource::Cluster, 10);
        ws.upsert(spot("A1A", 14_025.0));
        ws.upsert(spot("B1B", 14_025.0));
        ws.upsert(spot("A1A", 14_026.0));
        let order: Vec<_> = ws.iter().map(|s| s.station_id.as_str()).collect();
        assert_eq!(order, vec!["B1B", "A1A"]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut ws = WorkingSet::with_capacity(SpotSource::Skimmer, 3);
        for call in ["A1A", "B1B", "C1C", "D1D"] {
            ws.upsert(spot(call, 14_025.0));
        }
        let order: Vec<_> = ws.iter().map(|s| s.station_id.as_str()).collect();
        assert_eq!(order, vec!["B1B", "C1C", "D1D"]);
    }

    #[test]
    fn test_replace_all() {
        let mut ws = WorkingSet::new(SpotSource::Pota);
        ws.replace_all(vec![spot("A1A", 14_025.0)]);
        ws.replace_all(vec![spot("B1B", 14_025.0), spot("B1B", 14_030.0)]);
        assert_eq!(ws.len(), 1);
        assert_eq!(ws.snapshot()[0].frequency_khz, 14_030.0);
    }

    #[test]
    fn test_replace_all_keeps_most_recent_observation() {
        // Newest-first feed order
        let now = Utc::now();
        let newer = Spot::new(SpotSource::Sota, "W7ABC", 14_285.0, now);
        let older = Spot::new(SpotSource::Sota, "W7ABC", 14_062.0, now - Duration::minutes(20));

        let mut ws = WorkingSet::new(SpotSource::Sota);
        ws.replace_all(vec![newer.clone(), older.clone()]);
        assert_eq!(ws.len(), 1);
        let kept = ws.get(&newer.key()).unwrap();
        assert_eq!(kept.observed_at, now);
        assert_eq!(kept.frequency_khz, 14_285.0);

        ws.replace_all(vec![older, newer]);
        assert_eq!(ws.snapshot()[0].frequency_khz, 14_285.0);
    }
}
