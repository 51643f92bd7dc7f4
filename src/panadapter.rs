//! # Panadapter Feed
//!
//! Keeps an external spectrum display's marker list in step with the merged
//! view. Each delivery computes the difference between what the display holds
//! (the peer state) and what it should hold, and sends only that difference:
//! removals first, then additions and updates.
//!
//! Spots older than the configured maximum age are left out. A maximum age of
//! zero disables the age filter. A disabled feed converges to an empty marker
//! list. The peer state only advances once the sink
//! has accepted the operations, so a failed push is retried in full on the
//! next delivery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{debug, info};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;

use crate::distribution::{BatchConsumer, SinkError, SpotView};
use crate::metrics;
use crate::spot::{Spot, SpotKey};

pub const PANADAPTER_MIN_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(15 * 60);
/// Marker lifetime when the age filter is disabled.
pub const DEFAULT_MARKER_LIFETIME: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub station_id: String,
    pub frequency_khz: f64,
    pub mode: String,
    pub label: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkerOp {
    Add(Marker),
    Update(Marker),
    Remove(Marker),
}

impl MarkerOp {
    pub fn kind(&self) -> &'static str {
        match self {
            MarkerOp::Add(_) => "add",
            MarkerOp::Update(_) => "update",
            MarkerOp::Remove(_) => "remove",
        }
    }

    pub fn marker(&self) -> &Marker {
        match self {
            MarkerOp::Add(m) | MarkerOp::Update(m) | MarkerOp::Remove(m) => m,
        }
    }
}

#[async_trait]
pub trait PanadapterSink: Send + Sync {
    fn name(&self) -> &str;
    async fn apply(&self, ops: &[MarkerOp]) -> Result<(), SinkError>;
}

/// Logs marker operations instead of talking to hardware.
pub struct LogPanadapterSink {
    name: String,
}

impl LogPanadapterSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl PanadapterSink for LogPanadapterSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, ops: &[MarkerOp]) -> Result<(), SinkError> {
        for op in ops {
            let m = op.marker();
            debug!(
                "[{}] {} {} @ {:.1} kHz {}",
                self.name,
                op.kind(),
                m.station_id,
                m.frequency_khz,
                m.mode
            );
        }
        info!("📡 [{}] Applied {} marker ops", self.name, ops.len());
        Ok(())
    }
}

/// Builds the marker a spot should produce.
pub fn marker_for(spot: &Spot, max_age: Duration) -> Marker {
    let lifetime = if max_age.is_zero() {
        DEFAULT_MARKER_LIFETIME
    } else {
        max_age
    };
    let lifetime = chrono::Duration::from_std(lifetime).unwrap_or_else(|_| chrono::Duration::minutes(15));
    Marker {
        station_id: spot.station_id.clone(),
        frequency_khz: spot.frequency_khz,
        mode: spot.mode.clone(),
        label: spot.reference.clone().or_else(|| spot.label.clone()),
        expires_at: spot.observed_at + lifetime,
    }
}

/// Runtime switches for one feed, updated on reconfiguration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedControl {
    pub enabled: bool,
    pub max_age: Duration,
}

impl Default for FeedControl {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

pub struct PanadapterFeed {
    sink: Box<dyn PanadapterSink>,
    control: watch::Receiver<FeedControl>,
    min_interval: Duration,
    peer: HashMap<SpotKey, Marker>,
}

impl PanadapterFeed {
    pub fn new(sink: Box<dyn PanadapterSink>, control: watch::Receiver<FeedControl>) -> Self {
        Self {
            sink,
            control,
            min_interval: PANADAPTER_MIN_INTERVAL,
            peer: HashMap::new(),
        }
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn peer_len(&self) -> usize {
        self.peer.len()
    }

    /// Operations that take the peer from its current state to `view`, and
    /// the peer state after they are applied.
    pub fn diff(&self, view: &[Spot], now: DateTime<Utc>) -> (Vec<MarkerOp>, HashMap<SpotKey, Marker>) {
        let FeedControl { enabled, max_age } = *self.control.borrow();

        let mut wanted: IndexMap<SpotKey, Marker> = IndexMap::new();
        for spot in view.iter().filter(|_| enabled) {
            if spot.band.is_none() {
                continue;
            }
            if !max_age.is_zero() {
                let age = spot.age(now).to_std().unwrap_or(Duration::ZERO);
                if age > max_age {
                    continue;
                }
            }
            wanted
                .entry(spot.key())
                .or_insert_with(|| marker_for(spot, max_age));
        }

        let mut removes: Vec<Marker> = self
            .peer
            .iter()
            .filter(|(key, _)| !wanted.contains_key(*key))
            .map(|(_, m)| m.clone())
            .collect();
        removes.sort_by(|a, b| a.station_id.cmp(&b.station_id));

        let mut ops: Vec<MarkerOp> = removes.into_iter().map(MarkerOp::Remove).collect();
        for (key, marker) in &wanted {
            match self.peer.get(key) {
                None => ops.push(MarkerOp::Add(marker.clone())),
                Some(old) if old != marker => ops.push(MarkerOp::Update(marker.clone())),
                Some(_) => {}
            }
        }
        (ops, wanted.into_iter().collect())
    }
}

#[async_trait]
impl BatchConsumer for PanadapterFeed {
    fn name(&self) -> &str {
        self.sink.name()
    }

    fn min_interval(&self) -> Duration {
        self.min_interval
    }

    async fn deliver(&mut self, view: SpotView) -> Result<(), SinkError> {
        let (ops, next) = self.diff(&view, Utc::now());
        if !ops.is_empty() {
            self.sink.apply(&ops).await?;
            for kind in ["add", "update", "remove"] {
                let count = ops.iter().filter(|op| op.kind() == kind).count() as u64;
                if count > 0 {
                    metrics::increment_panadapter_ops(self.sink.name(), kind, count);
                }
            }
        }
        self.peer = next;
        Ok(())
    }
}
