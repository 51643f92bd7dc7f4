//! # Spotfeed Service
//!
//! Runs the spot hub with log-backed panadapter and notification sinks and
//! prints a merged-view summary once a minute.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin spotfeed -- --config Config.toml --cty cty.dat
//! ```
//!
//! Press Ctrl+C to stop gracefully.

use anyhow::{Context, Result};
use clap::Parser;
use spotfeed::{metrics, HubEvent, PrefixIndex, Settings, SpotHub, SpotSource};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, Duration, MissedTickBehavior};

const SUMMARY_INTERVAL: Duration = Duration::from_secs(60);

/// Command-line arguments for spotfeed
#[derive(Parser, Debug)]
#[command(name = "spotfeed")]
#[command(about = "Amateur-radio activity spot aggregator")]
#[command(version)]
struct Args {
    /// Settings file (TOML)
    #[arg(short, long, default_value = "Config.toml")]
    config: String,

    /// Prefix database, overrides `geo.cty_path`
    #[arg(long)]
    cty: Option<PathBuf>,

    /// Prometheus listener address
    #[cfg(feature = "observability")]
    #[arg(long, default_value = "127.0.0.1:9187")]
    metrics_addr: std::net::SocketAddr,
}

#[cfg(feature = "observability")]
fn init_logging() {
    // Also captures `log` records through the subscriber's log bridge
    tracing_subscriber::fmt().json().init();
}

#[cfg(not(feature = "observability"))]
fn init_logging() {
    env_logger::init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_logging();
    let args = Args::parse();

    println!("🚀 Starting spotfeed");

    let settings = Settings::load(&args.config)
        .with_context(|| format!("loading settings from {}", args.config))?;
    println!("✅ Settings loaded");

    let cty_path = args
        .cty
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.geo.cty_path));
    let index = PrefixIndex::load(&cty_path)
        .with_context(|| format!("loading prefix database {}", cty_path.display()))?;
    println!("✅ Prefix database: {} entities", index.entity_count());

    #[cfg(feature = "observability")]
    {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(args.metrics_addr)
            .install()
            .context("installing Prometheus exporter")?;
        println!("✅ Metrics on http://{}/metrics", args.metrics_addr);
    }
    metrics::describe_metrics();

    let hub = SpotHub::start(settings, Arc::new(index)).await?;
    let mut events = hub.subscribe();
    println!("✅ Hub running, press Ctrl+C to stop");

    let mut summary = interval(SUMMARY_INTERVAL);
    summary.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                println!("\n🛑 Shutdown signal received, stopping sources...");
                break;
            }
            _ = summary.tick() => {
                print_summary(&hub.merged_view());
            }
            event = events.recv() => match event {
                Ok(HubEvent::SpotsUpdated(view)) => {
                    log::debug!("[spotfeed] Merged view now {} spots", view.len());
                }
                Ok(HubEvent::ConnectionChanged(status)) => {
                    println!(
                        "📶 {} {} {}{}",
                        status.feed,
                        status.endpoint,
                        status.state,
                        status.detail.map(|d| format!(" ({})", d)).unwrap_or_default()
                    );
                }
                Ok(HubEvent::AllSourcesFailed { detail }) => {
                    eprintln!("❌ All spot sources are failing: {}", detail);
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("⚠️ [spotfeed] UI bus lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    hub.shutdown().await;
    println!("✅ Shutdown complete");
    Ok(())
}

fn print_summary(view: &[spotfeed::Spot]) {
    let mut per_source: BTreeMap<SpotSource, usize> = BTreeMap::new();
    for spot in view {
        *per_source.entry(spot.source).or_default() += 1;
    }
    let parts: Vec<String> = per_source
        .iter()
        .map(|(source, count)| format!("{}={}", source, count))
        .collect();
    println!("📋 {} spots [{}]", view.len(), parts.join(", "));
}
