// src/adapters/digital.rs
// Digital-mode reception reports for watched stations.
//
// The feed is a JSON document with a reception-report array whose elements
// carry senderCallsign, frequency (Hz), mode, flowStartSeconds (unix),
// receiverCallsign and sNR. Only senders in the watch set are kept.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use serde::Deserialize;

use crate::enrichment::SpotEnricher;
use crate::source_adapter::{
    decode_each, fetch_json_elements, number_field, parse_endpoint_url, SourceError,
    SpotSourceAdapter,
};
use crate::spot::{normalize_mode, Spot, SpotSource};
use crate::watch_list::{SharedWatchSet, WatchSet};

pub const DEFAULT_URL: &str =
    "https://retrieve.pskreporter.info/query?format=json&rronly=1&flowStartSeconds=-900";
/// Array of reception reports inside the feed document.
const REPORTS_FIELD: &str = "receptionReport";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceptionReport {
    sender_callsign: String,
    #[serde(default)]
    frequency: serde_json::Value,
    mode: Option<String>,
    flow_start_seconds: Option<i64>,
    receiver_callsign: Option<String>,
    #[serde(rename = "sNR")]
    snr: Option<i32>,
}

impl ReceptionReport {
    fn to_spot(&self, now: DateTime<Utc>, watch: &WatchSet) -> Option<Spot> {
        if !watch.contains(&self.sender_callsign) {
            return None;
        }
        let hz = number_field(&self.frequency).filter(|f| *f > 0.0)?;
        let khz = hz / 1000.0;
        let observed_at = self
            .flow_start_seconds
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or(now);

        let mut spot = Spot::new(SpotSource::Digital, &self.sender_callsign, khz, observed_at);
        spot.mode = self
            .mode
            .as_deref()
            .map(normalize_mode)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "FT8".to_string());
        spot.spotter = self.receiver_callsign.clone().filter(|s| !s.is_empty());
        spot.snr_db = self.snr;
        Some(spot)
    }
}

pub struct DigitalAdapter {
    client: reqwest::Client,
    url: url::Url,
    watch: SharedWatchSet,
}

impl DigitalAdapter {
    pub fn new(
        client: reqwest::Client,
        url: &str,
        watch: SharedWatchSet,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            client,
            url: parse_endpoint_url(url)?,
            watch,
        })
    }
}

#[async_trait]
impl SpotSourceAdapter for DigitalAdapter {
    fn name(&self) -> &'static str {
        "Digital"
    }

    fn source(&self) -> SpotSource {
        SpotSource::Digital
    }

    async fn fetch_spots(&self, enricher: &SpotEnricher) -> Result<Vec<Spot>, SourceError> {
        let watch = self.watch.load_full();
        if watch.is_empty() {
            return Ok(Vec::new());
        }
        let items = fetch_json_elements(&self.client, &self.url, Some(REPORTS_FIELD)).await?;
        let now = Utc::now();
        let spots: Vec<Spot> = decode_each::<ReceptionReport>(self.name(), items)
            .iter()
            .filter_map(|r| r.to_spot(now, &watch))
            .map(|s| enricher.enrich(s))
            .collect();
        debug!("[Digital] Converted {} watched reports", spots.len());
        Ok(spots)
    }
}
