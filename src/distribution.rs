//! # Throttled Distribution
//!
//! Fans the merged view out to consumers on their own cadence:
//!
//! - **UI path**: every published view goes straight onto the hub's broadcast
//!   bus, no coalescing.
//! - **Batched path**: a debounce task waits for a change, sleeps the debounce
//!   window, then hands the latest view to the batched consumers once. Bursts
//!   inside the window collapse into a single delivery.
//! - Each batched consumer runs in its own task behind a `watch` channel and
//!   enforces its own minimum interval, so a slow or failing consumer never
//!   holds up another one.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

use crate::hub::HubEvent;
use crate::spot::Spot;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

pub type SpotView = Arc<Vec<Spot>>;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("{sink} rejected the update: {reason}")]
    Rejected { sink: String, reason: String },
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A consumer fed from the debounced path.
#[async_trait]
pub trait BatchConsumer: Send + 'static {
    fn name(&self) -> &str;

    /// Minimum spacing between two deliveries to this consumer.
    fn min_interval(&self) -> Duration;

    async fn deliver(&mut self, view: SpotView) -> Result<(), SinkError>;
}

pub struct Distributor {
    ui: broadcast::Sender<HubEvent>,
    latest_tx: watch::Sender<SpotView>,
    batched_tx: Arc<watch::Sender<SpotView>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Distributor {
    pub fn new(ui: broadcast::Sender<HubEvent>, debounce: Duration) -> Self {
        let (latest_tx, latest_rx) = watch::channel(SpotView::default());
        let (batched_tx, _) = watch::channel(SpotView::default());
        let batched_tx = Arc::new(batched_tx);
        let debouncer = tokio::spawn(debounce_loop(latest_rx, batched_tx.clone(), debounce));
        Self {
            ui,
            latest_tx,
            batched_tx,
            tasks: vec![debouncer],
        }
    }

    /// Registers a batched consumer in its own task.
    pub fn add_consumer(&mut self, consumer: Box<dyn BatchConsumer>) {
        let rx = self.batched_tx.subscribe();
        self.tasks.push(tokio::spawn(consumer_loop(consumer, rx)));
    }

    /// Publishes a new merged view.
    pub fn publish(&self, view: SpotView) {
        // No UI subscribers is fine
        let _ = self.ui.send(HubEvent::SpotsUpdated(view.clone()));
        self.latest_tx.send_replace(view);
    }

    pub fn latest(&self) -> SpotView {
        self.latest_tx.borrow().clone()
    }

    pub fn consumer_count(&self) -> usize {
        self.tasks.len().saturating_sub(1)
    }
}

impl Drop for Distributor {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn debounce_loop(
    mut latest_rx: watch::Receiver<SpotView>,
    batched_tx: Arc<watch::Sender<SpotView>>,
    window: Duration,
) {
    while latest_rx.changed().await.is_ok() {
        sleep(window).await;
        let view = latest_rx.borrow_and_update().clone();
        debug!("[Distributor] Debounced view of {} spots", view.len());
        batched_tx.send_replace(view);
    }
}

async fn consumer_loop(mut consumer: Box<dyn BatchConsumer>, mut rx: watch::Receiver<SpotView>) {
    let min_interval = consumer.min_interval();
    let mut last_delivery: Option<Instant> = None;

    while rx.changed().await.is_ok() {
        if let Some(at) = last_delivery {
            sleep_until(at + min_interval).await;
        }
        let view = rx.borrow_and_update().clone();
        if let Err(e) = consumer.deliver(view).await {
            warn!("⚠️ [{}] Delivery failed, will retry on next update: {}", consumer.name(), e);
        }
        last_delivery = Some(Instant::now());
    }
}
