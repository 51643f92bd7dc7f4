//! # Spotfeed
//!
//! Real-time ingestion, merge and distribution of amateur-radio activity
//! spots. Spotfeed pulls "station X is on the air on frequency F" reports
//! from program feeds (parks, summits, flora & fauna, bunkers, digital
//! reception networks) and from telnet-style DX cluster and skimmer feeds,
//! normalizes them into one [`Spot`] model, merges and deduplicates them, and
//! pushes the result to a UI bus, panadapter displays and a watch-list
//! notifier.
//!
//! ## Overview
//!
//! - **Ingestion**: polled HTTP adapters and reconnecting stream clients run as
//!   independent tokio tasks, each owning its source's working set.
//! - **Enrichment**: callsign prefixes are resolved to an entity, continent and
//!   position; distance and bearing are computed from the home position.
//! - **Merge**: per-source dedup, park × flora-and-fauna cross-reference and a
//!   stable source order.
//! - **Distribution**: immediate UI updates plus a debounced path feeding
//!   consumers on their own minimum intervals.
//!
//! ## Architecture
//!
//! ### Sources
//! [`polling`] drives a [`SpotSourceAdapter`] on an interval; [`stream_client`]
//! drives a telnet feed with a [`LineParser`](stream_client::LineParser).
//!
//! ### Coordinator
//! [`SpotHub`] owns the sources, re-runs the merge on every snapshot change and
//! reports connectivity and aggregate failure on its broadcast bus.

// Canonical Model
/// Spot model and normalization helpers
pub mod spot;
/// Amateur band table and band-plan mode inference
pub mod bands;
/// Per-source bounded working sets
pub mod working_set;
/// Operator watch list
pub mod watch_list;

// Geographic Resolution
/// Callsign prefix database
pub mod prefix_resolver;
/// Distance and bearing helpers
pub mod geo;
/// Spot enrichment from the prefix database and home position
pub mod enrichment;

// Streaming Sources
/// Reconnecting telnet-style stream client
pub mod stream_client;
/// Shared `DX de` line tokenizer
pub mod dx_line;
/// DX cluster line parser
pub mod cluster_parser;
/// Skimmer line parser
pub mod skimmer_parser;

// Polled Sources
/// Trait and helpers for HTTP spot adapters
pub mod source_adapter;
/// Program-specific adapters
pub mod adapters;
/// Cached summit coordinate lookups
pub mod summit_locator;
/// Interval scheduler for adapters
pub mod polling;

// Merge & Distribution
/// Latest snapshot per source and source events
pub mod snapshot_board;
/// Merge, dedup and cross-reference
pub mod merge;
/// Debounced fan-out to batched consumers
pub mod distribution;
/// Panadapter marker diffing
pub mod panadapter;
/// Watch-list notifications
pub mod notifier;
/// Source coordinator
pub mod hub;

// Infrastructure
/// Metrics and observability
pub mod metrics;
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use hub::{HubEvent, SpotHub};
pub use prefix_resolver::PrefixIndex;
pub use settings::Settings;
pub use source_adapter::SpotSourceAdapter;
pub use spot::{Spot, SpotSource};
