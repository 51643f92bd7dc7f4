//! # Polling Source
//!
//! Runs one [`SpotSourceAdapter`] on a fixed interval. Each successful cycle
//! replaces the source's working set and publishes a fresh snapshot; a failed
//! cycle keeps the previous snapshot and reports the error to the hub.
//!
//! The interval can be changed at runtime through [`PollingHandle::set_interval`].
//! The schedule restarts one full period after the change, so a cycle is
//! neither skipped nor fired twice.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use log::{debug, info, warn};

use crate::enrichment::SharedEnricher;
use crate::metrics;
use crate::snapshot_board::{SnapshotBoard, SourceEvent};
use crate::source_adapter::SpotSourceAdapter;
use crate::spot::SpotSource;
use crate::working_set::WorkingSet;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// Applies the refresh floor.
pub fn effective_interval(requested: Duration) -> Duration {
    requested.max(MIN_REFRESH_INTERVAL)
}

pub struct PollingSource {
    adapter: Arc<dyn SpotSourceAdapter>,
    enricher: SharedEnricher,
    board: SnapshotBoard,
    events: mpsc::Sender<SourceEvent>,
    working: WorkingSet,
}

/// Owner's handle to a running polling task. Dropping it stops the task.
pub struct PollingHandle {
    source: SpotSource,
    interval_tx: watch::Sender<Duration>,
    task: JoinHandle<()>,
}

impl PollingHandle {
    pub fn source(&self) -> SpotSource {
        self.source
    }

    pub fn interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }

    /// Reschedules the repeating fetch. No-op if the effective interval is unchanged.
    pub fn set_interval(&self, requested: Duration) {
        let period = effective_interval(requested);
        self.interval_tx.send_if_modified(|current| {
            if *current == period {
                false
            } else {
                *current = period;
                true
            }
        });
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl PollingSource {
    pub fn new(
        adapter: Arc<dyn SpotSourceAdapter>,
        enricher: SharedEnricher,
        board: SnapshotBoard,
        events: mpsc::Sender<SourceEvent>,
    ) -> Self {
        let working = WorkingSet::new(adapter.source());
        Self {
            adapter,
            enricher,
            board,
            events,
            working,
        }
    }

    pub fn spawn(self, requested: Duration) -> PollingHandle {
        let period = effective_interval(requested);
        let (interval_tx, interval_rx) = watch::channel(period);
        let source = self.adapter.source();
        let task = tokio::spawn(self.run(interval_rx));
        PollingHandle {
            source,
            interval_tx,
            task,
        }
    }

    async fn run(mut self, mut interval_rx: watch::Receiver<Duration>) {
        let period = *interval_rx.borrow_and_update();
        info!(
            "🚀 [{}] Polling every {:?}",
            self.adapter.name(),
            period
        );
        let mut ticker = new_ticker(interval(period));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.poll_once().await {
                        debug!("[{}] Hub gone, stopping", self.adapter.name());
                        return;
                    }
                }
                changed = interval_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let period = *interval_rx.borrow_and_update();
                    info!("🔄 [{}] Refresh interval now {:?}", self.adapter.name(), period);
                    ticker = new_ticker(interval_at(Instant::now() + period, period));
                }
            }
        }
    }

    /// Runs one fetch cycle. Returns `false` once the hub has gone away.
    pub async fn poll_once(&mut self) -> bool {
        let source = self.adapter.source();
        let enricher = self.enricher.load_full();
        let event = match self.adapter.fetch_spots(&enricher).await {
            Ok(spots) => {
                metrics::increment_spots_ingested(source.as_str(), spots.len() as u64);
                self.working.replace_all(spots);
                self.board.publish(source, self.working.snapshot());
                debug!("[{}] Working set now {} spots", self.adapter.name(), self.working.len());
                SourceEvent::Updated(source)
            }
            Err(e) => {
                metrics::increment_fetch_failure(source.as_str());
                warn!(
                    "⚠️ [{}] Fetch failed, keeping {} previous spots: {}",
                    self.adapter.name(),
                    self.working.len(),
                    e
                );
                SourceEvent::FetchFailed {
                    source,
                    error: format!("{}: {}", self.adapter.name(), e),
                }
            }
        };
        self.events.send(event).await.is_ok()
    }
}

fn new_ticker(mut ticker: Interval) -> Interval {
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
