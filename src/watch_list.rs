// src/watch_list.rs
// Operator watch set: own callsign plus an explicit list, matched exactly.

use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::spot::normalize_station_id;

/// Shared, lock-free handle readers load on every check.
pub type SharedWatchSet = Arc<ArcSwap<WatchSet>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchSet {
    stations: HashSet<String>,
}

impl WatchSet {
    pub fn new<I, S>(own_call: Option<&str>, list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let stations = own_call
            .into_iter()
            .map(normalize_station_id)
            .chain(list.into_iter().map(|s| normalize_station_id(s.as_ref())))
            .filter(|s| !s.is_empty())
            .collect();
        Self { stations }
    }

    /// Case-insensitive exact match.
    pub fn contains(&self, station_id: &str) -> bool {
        if self.stations.is_empty() {
            return false;
        }
        self.stations.contains(&normalize_station_id(station_id))
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn shared(self) -> SharedWatchSet {
        Arc::new(ArcSwap::from_pointee(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_uppercase_match() {
        let ws = WatchSet::new(Some("n0call"), ["k1abc", " DL1XYZ "]);
        assert_eq!(ws.len(), 3);
        assert!(ws.contains("N0CALL"));
        assert!(ws.contains("k1abc"));
        assert!(ws.contains("DL1XYZ"));
        assert!(!ws.contains("K1ABC/P"));
        assert!(!ws.contains("K1AB"));
    }

    #[test]
    fn test_swap_is_visible_to_readers() {
        let shared = WatchSet::new(None, ["K1ABC"]).shared();
        let reader = shared.clone();
        shared.store(Arc::new(WatchSet::new(None, ["W1AW"])));
        assert!(reader.load().contains("W1AW"));
        assert!(!reader.load().contains("K1ABC"));
    }
}
