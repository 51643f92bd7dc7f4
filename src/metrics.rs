// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_gauge, gauge, increment_counter};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! increment_counter {
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, gauge, increment_counter};

/// Initializes the descriptions for all the metrics in the application.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_counter!(
        "spots_ingested_total",
        "Spots accepted into a working set, labelled by source."
    );
    describe_counter!(
        "source_fetch_failures_total",
        "Polling cycles that failed, labelled by source."
    );
    describe_counter!(
        "stream_reconnects_total",
        "Reconnect attempts scheduled by a streaming client, labelled by endpoint."
    );
    describe_counter!(
        "stream_lines_dropped_total",
        "Lines from a streaming feed the parser could not use."
    );
    describe_counter!(
        "notifications_raised_total",
        "Watch-list notifications that passed the rolling window."
    );
    describe_counter!(
        "panadapter_ops_total",
        "Marker operations handed to a panadapter sink, labelled by sink and op."
    );
    describe_counter!("cache_hits_total", "Cache hits, labelled by cache.");
    describe_counter!("cache_miss_total", "Cache misses, labelled by cache.");
    describe_gauge!("working_set_size", "Spots held per source working set.");
    describe_gauge!("merged_view_size", "Spots in the merged view after dedup.");
    describe_gauge!(
        "stream_connected",
        "Streaming client connectivity (1=connected), labelled by endpoint."
    );
}

pub fn increment_spots_ingested(source: &str, count: u64) {
    counter!("spots_ingested_total", count, "source" => source.to_string());
}

pub fn increment_fetch_failure(source: &str) {
    increment_counter!("source_fetch_failures_total", "source" => source.to_string());
}

pub fn increment_reconnect(endpoint: &str) {
    increment_counter!("stream_reconnects_total", "endpoint" => endpoint.to_string());
}

pub fn increment_lines_dropped(endpoint: &str) {
    increment_counter!("stream_lines_dropped_total", "endpoint" => endpoint.to_string());
}

pub fn increment_notifications() {
    increment_counter!("notifications_raised_total");
}

pub fn increment_panadapter_ops(sink: &str, op: &str, count: u64) {
    counter!(
        "panadapter_ops_total",
        count,
        "sink" => sink.to_string(),
        "op" => op.to_string()
    );
}

pub fn increment_cache_hit(cache_name: &str) {
    counter!("cache_hits_total", 1, "cache" => cache_name.to_string());
}

pub fn increment_cache_miss(cache_name: &str) {
    counter!("cache_miss_total", 1, "cache" => cache_name.to_string());
}

pub fn set_working_set_size(source: &str, size: f64) {
    gauge!("working_set_size", size, "source" => source.to_string());
}

pub fn set_merged_view_size(size: f64) {
    gauge!("merged_view_size", size);
}

pub fn set_stream_connected(endpoint: &str, connected: bool) {
    let value = if connected { 1.0 } else { 0.0 };
    gauge!("stream_connected", value, "endpoint" => endpoint.to_string());
}
