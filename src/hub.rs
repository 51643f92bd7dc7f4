//! # Spot Hub
//!
//! Owns every source for one operator session and exposes the merged view.
//!
//! ## Tasks
//!
//! - one [`PollingSource`] task per enabled HTTP program feed
//! - one [`StreamClient`] driver plus one ingest task per enabled telnet feed;
//!   the ingest task owns that feed's [`WorkingSet`]
//! - the coordinator task: the single reader of [`SourceEvent`]s. It re-runs
//!   the merge whenever a snapshot changes, hands the result to the
//!   [`Distributor`], forwards connection changes and decides when every
//!   polled source has failed
//!
//! Sources never touch each other's state; the coordinator only reads
//! published snapshots.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use log::{debug, error, info, warn};

use crate::adapters::{build_adapter, build_support};
use crate::cluster_parser::ClusterParser;
use crate::distribution::{Distributor, SpotView};
use crate::enrichment::{SharedEnricher, SpotEnricher};
use crate::merge::merge_sources;
use crate::metrics;
use crate::notifier::{LogNotificationSink, NotificationSink, Notifier};
use crate::panadapter::{FeedControl, LogPanadapterSink, PanadapterFeed, PanadapterSink};
use crate::polling::{PollingHandle, PollingSource};
use crate::prefix_resolver::PrefixIndex;
use crate::settings::Settings;
use crate::skimmer_parser::SkimmerParser;
use crate::snapshot_board::{SnapshotBoard, SourceEvent};
use crate::source_adapter::{SourceError, SpotSourceAdapter};
use crate::spot::{IntoSpot, SpotSource};
use crate::stream_client::{
    Connector, ConnectionStatus, Endpoint, LineParser, StreamClient, StreamConfig, StreamEvent,
    TcpConnector,
};
use crate::summit_locator::SummitLocator;
use crate::watch_list::{SharedWatchSet, WatchSet};
use crate::working_set::WorkingSet;

const SOURCE_EVENT_CAPACITY: usize = 1024;
const STREAM_EVENT_CAPACITY: usize = 512;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// What presentation layers observe.
#[derive(Debug, Clone)]
pub enum HubEvent {
    SpotsUpdated(SpotView),
    ConnectionChanged(ConnectionStatus),
    /// Every enabled polled source failed and nothing is left to show.
    AllSourcesFailed { detail: String },
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("source setup failed: {0}")]
    Source(#[from] SourceError),
    #[error("coordinator is not running")]
    Stopped,
}

/// Sinks wired into the batched path at startup.
pub struct HubSinks {
    pub notifications: Box<dyn NotificationSink>,
    pub panadapters: Vec<Box<dyn PanadapterSink>>,
}

impl HubSinks {
    /// Log-backed sinks: one panadapter per configured name.
    pub fn logging(settings: &Settings) -> Self {
        let mut names: Vec<&String> = settings.panadapters.keys().collect();
        names.sort();
        Self {
            notifications: Box::new(LogNotificationSink),
            panadapters: names
                .into_iter()
                .map(|name| Box::new(LogPanadapterSink::new(name.clone())) as Box<dyn PanadapterSink>)
                .collect(),
        }
    }
}

/// A running telnet feed. Its ingest task drains whatever the client already
/// sent and exits once the client is gone.
struct StreamFeedHandle<P: LineParser, C: Connector> {
    client: StreamClient<P, C>,
}

impl<P: LineParser, C: Connector> Drop for StreamFeedHandle<P, C> {
    fn drop(&mut self) {
        self.client.disconnect();
    }
}

pub struct SpotHub<C: Connector + Clone = TcpConnector> {
    settings: Settings,
    connector: C,
    board: SnapshotBoard,
    enricher: SharedEnricher,
    watch: SharedWatchSet,
    events_tx: mpsc::Sender<SourceEvent>,
    ui_tx: broadcast::Sender<HubEvent>,
    distributor: Arc<Distributor>,
    client: reqwest::Client,
    locator: Arc<SummitLocator>,
    custom_adapters: HashMap<SpotSource, Arc<dyn SpotSourceAdapter>>,
    pollers: HashMap<SpotSource, PollingHandle>,
    cluster: Option<StreamFeedHandle<ClusterParser, C>>,
    skimmer: Option<StreamFeedHandle<SkimmerParser, C>>,
    panadapter_controls: HashMap<String, watch::Sender<FeedControl>>,
    coordinator: Option<JoinHandle<()>>,
}

impl SpotHub<TcpConnector> {
    /// Starts every enabled source with the real HTTP and TCP transports.
    pub async fn start(settings: Settings, index: Arc<PrefixIndex>) -> Result<Self, HubError> {
        let sinks = HubSinks::logging(&settings);
        Self::start_with(settings, index, TcpConnector, sinks, HashMap::new()).await
    }
}

impl<C: Connector + Clone> SpotHub<C> {
    /// Starts the hub with an explicit transport and sinks. Entries in
    /// `custom_adapters` replace the HTTP adapter built for that source.
    pub async fn start_with(
        settings: Settings,
        index: Arc<PrefixIndex>,
        connector: C,
        sinks: HubSinks,
        custom_adapters: HashMap<SpotSource, Arc<dyn SpotSourceAdapter>>,
    ) -> Result<Self, HubError> {
        let (client, locator) = build_support(&settings)?;
        let watch = watch_set_for(&settings).shared();
        let enricher = SpotEnricher::new(index, settings.station.home()).shared();
        let board = SnapshotBoard::new();
        let (events_tx, events_rx) = mpsc::channel(SOURCE_EVENT_CAPACITY);
        let (ui_tx, _) = broadcast::channel(settings.distribution.ui_bus_capacity.max(1));

        let mut distributor = Distributor::new(ui_tx.clone(), settings.distribution.debounce());
        distributor.add_consumer(Box::new(Notifier::new(
            watch.clone(),
            settings.watch.notification_window(),
            sinks.notifications,
        )));

        let mut panadapter_controls = HashMap::new();
        for sink in sinks.panadapters {
            let name = sink.name().to_string();
            let pan = settings.panadapters.get(&name).cloned().unwrap_or_default();
            let (control_tx, control_rx) = watch::channel(FeedControl {
                enabled: pan.enabled,
                max_age: pan.max_age(),
            });
            let feed = PanadapterFeed::new(sink, control_rx).with_min_interval(pan.min_interval());
            distributor.add_consumer(Box::new(feed));
            panadapter_controls.insert(name, control_tx);
        }
        let distributor = Arc::new(distributor);

        let coordinator = Coordinator {
            board: board.clone(),
            distributor: distributor.clone(),
            ui_tx: ui_tx.clone(),
            enabled: HashSet::new(),
            outcomes: HashMap::new(),
            merged_len: 0,
            failure_reported: false,
        };
        let coordinator = tokio::spawn(coordinator.run(events_rx));

        let mut hub = Self {
            settings: settings.clone(),
            connector,
            board,
            enricher,
            watch,
            events_tx,
            ui_tx,
            distributor,
            client,
            locator,
            custom_adapters,
            pollers: HashMap::new(),
            cluster: None,
            skimmer: None,
            panadapter_controls,
            coordinator: Some(coordinator),
        };
        hub.sync_sources(&settings).await?;
        info!(
            "✅ [SpotHub] Started: {} polled sources, cluster={}, skimmer={}",
            hub.pollers.len(),
            hub.cluster.is_some(),
            hub.skimmer.is_some()
        );
        Ok(hub)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.ui_tx.subscribe()
    }

    /// Last merged view handed to the distribution layer.
    pub fn merged_view(&self) -> SpotView {
        self.distributor.latest()
    }

    pub fn watch_set(&self) -> SharedWatchSet {
        self.watch.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_enabled(&self, source: SpotSource) -> bool {
        match source {
            SpotSource::Cluster => self.cluster.is_some(),
            SpotSource::Skimmer => self.skimmer.is_some(),
            _ => self.pollers.contains_key(&source),
        }
    }

    /// Applies changed operator settings to running sources and consumers.
    pub async fn reconfigure(&mut self, settings: Settings) -> Result<(), HubError> {
        if self.coordinator.is_none() {
            return Err(HubError::Stopped);
        }

        let watch = watch_set_for(&settings);
        if **self.watch.load() != watch {
            info!("🔄 [SpotHub] Watch set now {} stations", watch.len());
            self.watch.store(Arc::new(watch));
        }

        let home = settings.station.home();
        if self.enricher.load().home() != home {
            info!("🔄 [SpotHub] Home position changed");
            let next = self.enricher.load().with_home(home);
            self.enricher.store(Arc::new(next));
        }

        let refresh = settings.polling.refresh_interval();
        for poller in self.pollers.values() {
            let before = poller.interval();
            poller.set_interval(refresh);
            if poller.interval() != before {
                info!("⏱️ [SpotHub] {} now polling every {:?}", poller.source(), poller.interval());
            }
        }

        for (name, control) in &self.panadapter_controls {
            let pan = settings.panadapters.get(name).cloned().unwrap_or_default();
            let next = FeedControl {
                enabled: pan.enabled,
                max_age: pan.max_age(),
            };
            control.send_if_modified(|current| {
                if *current == next {
                    false
                } else {
                    *current = next;
                    true
                }
            });
        }
        for name in settings.panadapters.keys() {
            if !self.panadapter_controls.contains_key(name) {
                warn!("⚠️ [SpotHub] Panadapter '{}' added at runtime; restart to attach it", name);
            }
        }

        self.sync_sources(&settings).await?;
        self.settings = settings;
        Ok(())
    }

    /// Disconnects stream clients and stops polling. The coordinator drains
    /// the remaining events (including the final disconnect statuses) before
    /// it exits.
    pub async fn shutdown(mut self) {
        self.cluster.take();
        self.skimmer.take();
        self.pollers.clear();
        let coordinator = self.coordinator.take();
        drop(self);

        if let Some(mut coordinator) = coordinator {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut coordinator).await.is_err() {
                warn!("⚠️ [SpotHub] Coordinator did not drain in {:?}", SHUTDOWN_GRACE);
                coordinator.abort();
            }
        }
        info!("🛑 [SpotHub] Stopped");
    }

    /// Starts, stops or reconnects sources so they match `settings`.
    async fn sync_sources(&mut self, settings: &Settings) -> Result<(), HubError> {
        for source in SpotSource::ALL.into_iter().filter(|s| s.is_polled()) {
            let wanted = settings.sources.is_enabled(source);
            let running = self.pollers.contains_key(&source);
            if wanted && !running {
                let adapter = match self.custom_adapters.get(&source) {
                    Some(adapter) => Some(adapter.clone()),
                    None => build_adapter(source, settings, &self.client, &self.locator, &self.watch)?,
                };
                if let Some(adapter) = adapter {
                    self.notify(SourceEvent::Enabled(source)).await?;
                    let poller = PollingSource::new(
                        adapter,
                        self.enricher.clone(),
                        self.board.clone(),
                        self.events_tx.clone(),
                    );
                    self.pollers
                        .insert(source, poller.spawn(settings.polling.refresh_interval()));
                }
            } else if !wanted && running {
                self.pollers.remove(&source);
                self.retire(source).await?;
            }
        }

        self.sync_cluster(settings).await?;
        self.sync_skimmer(settings).await?;
        Ok(())
    }

    async fn sync_cluster(&mut self, settings: &Settings) -> Result<(), HubError> {
        let wanted = settings.sources.cluster;
        if wanted && self.cluster.is_none() {
            self.notify(SourceEvent::Enabled(SpotSource::Cluster)).await?;
            let capacity = settings.cluster_capacity();
            let feed = self.spawn_stream(
                SpotSource::Cluster,
                ClusterParser::new(),
                settings.cluster_config(),
                settings.cluster_endpoint(),
                capacity,
            );
            self.cluster = Some(feed);
        } else if !wanted && self.cluster.is_some() {
            self.cluster.take();
            self.retire(SpotSource::Cluster).await?;
        } else if let Some(feed) = self.cluster.as_mut() {
            refresh_stream(feed, settings.cluster_config(), settings.cluster_endpoint());
        }
        Ok(())
    }

    async fn sync_skimmer(&mut self, settings: &Settings) -> Result<(), HubError> {
        let wanted = settings.sources.skimmer;
        if wanted && self.skimmer.is_none() {
            self.notify(SourceEvent::Enabled(SpotSource::Skimmer)).await?;
            let capacity = settings.skimmer_capacity();
            let feed = self.spawn_stream(
                SpotSource::Skimmer,
                SkimmerParser::new(self.watch.clone()),
                settings.skimmer_config(),
                settings.skimmer_endpoint(),
                capacity,
            );
            self.skimmer = Some(feed);
        } else if !wanted && self.skimmer.is_some() {
            self.skimmer.take();
            self.retire(SpotSource::Skimmer).await?;
        } else if let Some(feed) = self.skimmer.as_mut() {
            refresh_stream(feed, settings.skimmer_config(), settings.skimmer_endpoint());
        }
        Ok(())
    }

    fn spawn_stream<P>(
        &self,
        source: SpotSource,
        parser: P,
        config: StreamConfig,
        endpoint: Endpoint,
        capacity: usize,
    ) -> StreamFeedHandle<P, C>
    where
        P: LineParser,
        P::Record: IntoSpot,
    {
        let (stream_tx, stream_rx) = mpsc::channel(STREAM_EVENT_CAPACITY);
        tokio::spawn(ingest_stream(
            WorkingSet::with_capacity(source, capacity),
            stream_rx,
            self.enricher.clone(),
            self.board.clone(),
            self.events_tx.clone(),
        ));
        let mut client = StreamClient::new(config, parser, self.connector.clone(), stream_tx);
        client.connect(endpoint);
        StreamFeedHandle { client }
    }

    async fn retire(&self, source: SpotSource) -> Result<(), HubError> {
        info!("⏹️ [SpotHub] {} disabled", source);
        self.board.clear(source);
        self.notify(SourceEvent::Disabled(source)).await
    }

    async fn notify(&self, event: SourceEvent) -> Result<(), HubError> {
        self.events_tx.send(event).await.map_err(|_| HubError::Stopped)
    }
}

impl<C: Connector + Clone> Drop for SpotHub<C> {
    fn drop(&mut self) {
        if let Some(coordinator) = self.coordinator.take() {
            coordinator.abort();
        }
    }
}

fn watch_set_for(settings: &Settings) -> WatchSet {
    WatchSet::new(settings.station.callsign.as_deref(), &settings.watch.list)
}

/// Reconnects a running feed when its endpoint or login changed.
fn refresh_stream<P: LineParser, C: Connector>(
    feed: &mut StreamFeedHandle<P, C>,
    config: StreamConfig,
    endpoint: Endpoint,
) {
    let login_changed = feed.client.config().login != config.login;
    let endpoint_changed = feed.client.endpoint() != Some(&endpoint);
    if !login_changed && !endpoint_changed {
        return;
    }
    info!(
        "🔄 [{}] Reconnecting to {} (login changed: {})",
        config.name, endpoint, login_changed
    );
    feed.client.set_login(config.login);
    feed.client.connect(endpoint);
}

/// Turns stream records into spots in the feed's working set.
async fn ingest_stream<R: IntoSpot + Send + 'static>(
    mut working: WorkingSet,
    mut stream_rx: mpsc::Receiver<StreamEvent<R>>,
    enricher: SharedEnricher,
    board: SnapshotBoard,
    events: mpsc::Sender<SourceEvent>,
) {
    let source = working.source();
    while let Some(event) = stream_rx.recv().await {
        let outgoing = match event {
            StreamEvent::Record(record) => {
                let spot = enricher.load().enrich(record.into_spot());
                working.upsert(spot);
                metrics::increment_spots_ingested(source.as_str(), 1);
                board.publish(source, working.snapshot());
                SourceEvent::Updated(source)
            }
            StreamEvent::Status(status) => SourceEvent::Connection(status),
        };
        if events.send(outgoing).await.is_err() {
            debug!("[{}] Hub gone, stopping ingest", source);
            return;
        }
    }
}

enum Outcome {
    Pending,
    Fetched,
    Failed(String),
}

struct Coordinator {
    board: SnapshotBoard,
    distributor: Arc<Distributor>,
    ui_tx: broadcast::Sender<HubEvent>,
    enabled: HashSet<SpotSource>,
    /// Latest cycle outcome per enabled polled source.
    outcomes: HashMap<SpotSource, Outcome>,
    merged_len: usize,
    failure_reported: bool,
}

impl Coordinator {
    async fn run(mut self, mut events_rx: mpsc::Receiver<SourceEvent>) {
        while let Some(event) = events_rx.recv().await {
            match event {
                SourceEvent::Enabled(source) => {
                    self.enabled.insert(source);
                    if source.is_polled() {
                        self.outcomes.insert(source, Outcome::Pending);
                    }
                }
                SourceEvent::Disabled(source) => {
                    self.enabled.remove(&source);
                    self.outcomes.remove(&source);
                    self.remerge();
                }
                SourceEvent::Updated(source) => {
                    if !self.enabled.contains(&source) {
                        // Late snapshot from a source that was just disabled
                        self.board.clear(source);
                        self.remerge();
                        continue;
                    }
                    if source.is_polled() {
                        self.outcomes.insert(source, Outcome::Fetched);
                        // Any successful fetch ends the outage episode
                        self.failure_reported = false;
                    }
                    self.remerge();
                }
                SourceEvent::FetchFailed { source, error } => {
                    if self.enabled.contains(&source) {
                        self.outcomes.insert(source, Outcome::Failed(error.clone()));
                        self.check_all_failed(&error);
                    }
                }
                SourceEvent::Connection(status) => {
                    let _ = self.ui_tx.send(HubEvent::ConnectionChanged(status));
                }
            }
        }
        debug!("[SpotHub] Coordinator finished");
    }

    fn remerge(&mut self) {
        let snapshots = self.board.snapshots();
        let merged = merge_sources(snapshots.iter().map(|(s, spots)| (*s, spots.as_slice())));
        self.merged_len = merged.len();
        if self.merged_len > 0 {
            self.failure_reported = false;
        }
        self.distributor.publish(Arc::new(merged));
    }

    fn check_all_failed(&mut self, latest_error: &str) {
        if self.outcomes.is_empty() || self.merged_len > 0 || self.failure_reported {
            return;
        }
        let all_failed = self
            .outcomes
            .values()
            .all(|outcome| matches!(outcome, Outcome::Failed(_)));
        if !all_failed {
            return;
        }
        self.failure_reported = true;
        error!("❌ [SpotHub] All sources failed: {}", latest_error);
        let _ = self.ui_tx.send(HubEvent::AllSourcesFailed {
            detail: latest_error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spot::Spot;

    fn coordinator() -> (Coordinator, broadcast::Receiver<HubEvent>) {
        let (ui_tx, ui_rx) = broadcast::channel(64);
        let distributor = Arc::new(Distributor::new(ui_tx.clone(), Duration::from_secs(2)));
        (
            Coordinator {
                board: SnapshotBoard::new(),
                distributor,
                ui_tx,
                enabled: HashSet::new(),
                outcomes: HashMap::new(),
                merged_len: 0,
                failure_reported: false,
            },
            ui_rx,
        )
    }

    fn failures(rx: &mut broadcast::Receiver<HubEvent>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let HubEvent::AllSourcesFailed { detail } = event {
                out.push(detail);
            }
        }
        out
    }

    #[tokio::test]
    async fn test_all_failed_needs_every_source() {
        let (mut c, mut rx) = coordinator();
        for source in [SpotSource::Pota, SpotSource::Sota] {
            c.enabled.insert(source);
            c.outcomes.insert(source, Outcome::Pending);
        }

        c.outcomes.insert(SpotSource::Pota, Outcome::Failed("pota down".into()));
        c.check_all_failed("pota down");
        assert!(failures(&mut rx).is_empty());

        c.outcomes.insert(SpotSource::Sota, Outcome::Failed("sota down".into()));
        c.check_all_failed("sota down");
        assert_eq!(failures(&mut rx), vec!["sota down".to_string()]);

        // Reported once per episode
        c.check_all_failed("sota down");
        assert!(failures(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_no_failure_while_data_exists() {
        let (mut c, mut rx) = coordinator();
        c.enabled.insert(SpotSource::Pota);
        c.enabled.insert(SpotSource::Cluster);
        c.board.publish(
            SpotSource::Cluster,
            Arc::new(vec![Spot::new(SpotSource::Cluster, "K1ABC", 14_025.0, chrono::Utc::now())]),
        );
        c.remerge();
        c.outcomes.insert(SpotSource::Pota, Outcome::Failed("down".into()));
        c.check_all_failed("down");
        assert!(failures(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_empty_recovery_starts_new_failure_episode() {
        let (c, mut rx) = coordinator();
        let (tx, events_rx) = mpsc::channel(16);
        let failed = |source, error: &str| SourceEvent::FetchFailed {
            source,
            error: error.to_string(),
        };
        for event in [
            SourceEvent::Enabled(SpotSource::Pota),
            SourceEvent::Enabled(SpotSource::Sota),
            failed(SpotSource::Pota, "down1"),
            failed(SpotSource::Sota, "down1"),
            // Both recover with empty fetches
            SourceEvent::Updated(SpotSource::Pota),
            SourceEvent::Updated(SpotSource::Sota),
            failed(SpotSource::Pota, "down2"),
            failed(SpotSource::Sota, "down2"),
        ] {
            tx.send(event).await.unwrap();
        }
        drop(tx);
        c.run(events_rx).await;

        assert_eq!(failures(&mut rx), vec!["down1".to_string(), "down2".to_string()]);
    }
}
