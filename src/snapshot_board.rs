// src/snapshot_board.rs
// Latest immutable snapshot per source, plus the events sources send the hub.
//
// Each slot is written only by its owning source task; the hub only reads.

use dashmap::DashMap;
use std::sync::Arc;

use crate::spot::{Spot, SpotSource};
use crate::stream_client::ConnectionStatus;

/// What a source task tells the hub.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// The hub started the source; polled sources now count toward failure
    /// aggregation.
    Enabled(SpotSource),
    /// The hub stopped the source and cleared its slot.
    Disabled(SpotSource),
    /// The source published a new snapshot.
    Updated(SpotSource),
    /// A polling cycle failed; the previous snapshot is still in place.
    FetchFailed { source: SpotSource, error: String },
    Connection(ConnectionStatus),
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotBoard {
    slots: Arc<DashMap<SpotSource, Arc<Vec<Spot>>>>,
}

impl SnapshotBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, source: SpotSource, spots: Arc<Vec<Spot>>) {
        crate::metrics::set_working_set_size(source.as_str(), spots.len() as f64);
        self.slots.insert(source, spots);
    }

    pub fn get(&self, source: SpotSource) -> Option<Arc<Vec<Spot>>> {
        self.slots.get(&source).map(|s| s.value().clone())
    }

    pub fn clear(&self, source: SpotSource) {
        crate::metrics::set_working_set_size(source.as_str(), 0.0);
        self.slots.remove(&source);
    }

    /// Current snapshots in merge order.
    pub fn snapshots(&self) -> Vec<(SpotSource, Arc<Vec<Spot>>)> {
        SpotSource::ALL
            .iter()
            .filter_map(|s| self.get(*s).map(|spots| (*s, spots)))
            .collect()
    }

    pub fn total_len(&self) -> usize {
        self.slots.iter().map(|s| s.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_snapshots_follow_source_order() {
        let board = SnapshotBoard::new();
        let spot = |src| Spot::new(src, "K1ABC", 14_025.0, Utc::now());
        board.publish(SpotSource::Cluster, Arc::new(vec![spot(SpotSource::Cluster)]));
        board.publish(SpotSource::Pota, Arc::new(vec![spot(SpotSource::Pota)]));
        let order: Vec<_> = board.snapshots().into_iter().map(|(s, _)| s).collect();
        assert_eq!(order, vec![SpotSource::Pota, SpotSource::Cluster]);
        assert_eq!(board.total_len(), 2);

        board.clear(SpotSource::Pota);
        assert!(board.get(SpotSource::Pota).is_none());
        assert_eq!(board.total_len(), 1);
    }
}
