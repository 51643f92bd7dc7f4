// src/notifier.rs
// Watch-list notifications with a rolling per-station suppression window.

use async_trait::async_trait;
use log::{debug, info};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::distribution::{BatchConsumer, SinkError, SpotView};
use crate::metrics;
use crate::spot::Spot;
use crate::watch_list::SharedWatchSet;

pub const NOTIFICATION_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Remembers which stations were announced recently.
#[derive(Debug)]
pub struct NotificationGate {
    window: Duration,
    last_notified: HashMap<String, Instant>,
}

impl NotificationGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_notified: HashMap::new(),
        }
    }

    /// `true` if `station_id` was not announced within the window; records it.
    pub fn should_notify(&mut self, station_id: &str, now: Instant) -> bool {
        let window = self.window;
        self.last_notified
            .retain(|_, at| now.saturating_duration_since(*at) < window);
        if self.last_notified.contains_key(station_id) {
            return false;
        }
        self.last_notified.insert(station_id.to_string(), now);
        true
    }

    pub fn tracked(&self) -> usize {
        self.last_notified.len()
    }
}

impl Default for NotificationGate {
    fn default() -> Self {
        Self::new(NOTIFICATION_WINDOW)
    }
}

/// Destination for watch-list alerts (desktop toast, sound, webhook, ...).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, spot: &Spot) -> Result<(), SinkError>;
}

/// Writes alerts to the application log.
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, spot: &Spot) -> Result<(), SinkError> {
        info!(
            "🔔 [Notifier] {} on {:.1} kHz {} ({})",
            spot.station_id,
            spot.frequency_khz,
            spot.mode,
            spot.source
        );
        Ok(())
    }
}

/// Batched consumer that raises one alert per watched station per window.
pub struct Notifier {
    gate: NotificationGate,
    watch: SharedWatchSet,
    sink: Box<dyn NotificationSink>,
}

impl Notifier {
    pub fn new(watch: SharedWatchSet, window: Duration, sink: Box<dyn NotificationSink>) -> Self {
        Self {
            gate: NotificationGate::new(window),
            watch,
            sink,
        }
    }
}

#[async_trait]
impl BatchConsumer for Notifier {
    fn name(&self) -> &str {
        "Notifier"
    }

    fn min_interval(&self) -> Duration {
        Duration::ZERO
    }

    async fn deliver(&mut self, view: SpotView) -> Result<(), SinkError> {
        let watch = self.watch.load_full();
        if watch.is_empty() {
            return Ok(());
        }
        let now = Instant::now();
        for spot in view.iter().filter(|s| watch.contains(&s.station_id)) {
            if !self.gate.should_notify(&spot.station_id, now) {
                debug!("[Notifier] {} suppressed inside window", spot.station_id);
                continue;
            }
            self.sink.notify(spot).await?;
            metrics::increment_notifications();
        }
        Ok(())
    }
}
