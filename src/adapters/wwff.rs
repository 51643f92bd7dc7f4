// src/adapters/wwff.rs
// World Wide Flora & Fauna spots.
//
// GET https://spots.wwff.co/static/spots.json returns an array of:
//   activator, frequency_khz (number), mode, reference, reference_name,
//   spot_time (unix seconds), spotter, remarks, latitude, longitude

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use serde::Deserialize;

use crate::enrichment::SpotEnricher;
use crate::source_adapter::{
    decode_each, fetch_json_elements, number_field, parse_endpoint_url, SourceError,
    SpotSourceAdapter,
};
use crate::spot::{clean_comment, resolve_mode, Spot, SpotSource};

pub const DEFAULT_URL: &str = "https://spots.wwff.co/static/spots.json";

#[derive(Debug, Deserialize)]
struct WwffSpot {
    activator: String,
    #[serde(default)]
    frequency_khz: serde_json::Value,
    mode: Option<String>,
    reference: Option<String>,
    reference_name: Option<String>,
    spot_time: Option<i64>,
    spotter: Option<String>,
    remarks: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl WwffSpot {
    fn to_spot(&self, now: DateTime<Utc>) -> Option<Spot> {
        let khz = number_field(&self.frequency_khz).filter(|f| *f > 0.0)?;
        if self.activator.trim().is_empty() {
            return None;
        }
        let observed_at = self
            .spot_time
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or(now);
        let comment = clean_comment(self.remarks.as_deref().unwrap_or_default());

        let mut spot = Spot::new(SpotSource::Wwff, &self.activator, khz, observed_at);
        spot.mode = resolve_mode(self.mode.as_deref(), &comment, khz);
        spot.comment = comment;
        spot.spotter = self.spotter.clone().filter(|s| !s.is_empty());
        spot.reference = self.reference.clone().filter(|s| !s.is_empty());
        spot.label = self.reference_name.clone().filter(|s| !s.is_empty());
        spot.latitude = self.latitude;
        spot.longitude = self.longitude;
        Some(spot)
    }
}

pub struct WwffAdapter {
    client: reqwest::Client,
    url: url::Url,
}

impl WwffAdapter {
    pub fn new(client: reqwest::Client, url: &str) -> Result<Self, SourceError> {
        Ok(Self {
            client,
            url: parse_endpoint_url(url)?,
        })
    }
}

#[async_trait]
impl SpotSourceAdapter for WwffAdapter {
    fn name(&self) -> &'static str {
        "WWFF"
    }

    fn source(&self) -> SpotSource {
        SpotSource::Wwff
    }

    async fn fetch_spots(&self, enricher: &SpotEnricher) -> Result<Vec<Spot>, SourceError> {
        let items = fetch_json_elements(&self.client, &self.url, None).await?;
        let now = Utc::now();
        let spots: Vec<Spot> = decode_each::<WwffSpot>(self.name(), items)
            .iter()
            .filter_map(|s| s.to_spot(now))
            .map(|s| enricher.enrich(s))
            .collect();
        debug!("[WWFF] Converted {} spots", spots.len());
        Ok(spots)
    }
}
