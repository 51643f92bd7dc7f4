// src/adapters/pota.rs
// Parks on the Air activator spots.
//
// GET https://api.pota.app/spot/activator returns an array of:
//   activator, frequency (kHz as string), mode, reference, name, locationDesc,
//   spotTime (ISO, no zone, UTC), spotter, comments, latitude, longitude

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Deserialize;

use crate::enrichment::SpotEnricher;
use crate::source_adapter::{
    decode_each, fetch_json_elements, number_field, parse_endpoint_url, parse_utc_timestamp,
    SourceError, SpotSourceAdapter,
};
use crate::spot::{clean_comment, resolve_mode, Spot, SpotSource};

pub const DEFAULT_URL: &str = "https://api.pota.app/spot/activator";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PotaSpot {
    activator: String,
    #[serde(default)]
    frequency: serde_json::Value,
    mode: Option<String>,
    reference: Option<String>,
    name: Option<String>,
    location_desc: Option<String>,
    spot_time: Option<String>,
    spotter: Option<String>,
    comments: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl PotaSpot {
    fn to_spot(&self, now: DateTime<Utc>) -> Option<Spot> {
        let khz = number_field(&self.frequency).filter(|f| *f > 0.0)?;
        if self.activator.trim().is_empty() {
            return None;
        }
        let observed_at = self
            .spot_time
            .as_deref()
            .and_then(parse_utc_timestamp)
            .unwrap_or(now);
        let comment = clean_comment(self.comments.as_deref().unwrap_or_default());

        let mut spot = Spot::new(SpotSource::Pota, &self.activator, khz, observed_at);
        spot.mode = resolve_mode(self.mode.as_deref(), &comment, khz);
        spot.comment = comment;
        spot.spotter = self.spotter.clone().filter(|s| !s.is_empty());
        spot.reference = self.reference.clone().filter(|s| !s.is_empty());
        spot.label = self.name.clone().filter(|s| !s.is_empty());
        spot.location_description = self.location_desc.clone().filter(|s| !s.is_empty());
        spot.latitude = self.latitude;
        spot.longitude = self.longitude;
        Some(spot)
    }
}

pub struct PotaAdapter {
    client: reqwest::Client,
    url: url::Url,
}

impl PotaAdapter {
    pub fn new(client: reqwest::Client, url: &str) -> Result<Self, SourceError> {
        Ok(Self {
            client,
            url: parse_endpoint_url(url)?,
        })
    }
}

#[async_trait]
impl SpotSourceAdapter for PotaAdapter {
    fn name(&self) -> &'static str {
        "POTA"
    }

    fn source(&self) -> SpotSource {
        SpotSource::Pota
    }

    async fn fetch_spots(&self, enricher: &SpotEnricher) -> Result<Vec<Spot>, SourceError> {
        let items = fetch_json_elements(&self.client, &self.url, None).await?;
        let now = Utc::now();
        let spots: Vec<Spot> = decode_each::<PotaSpot>(self.name(), items)
            .iter()
            .filter_map(|s| s.to_spot(now))
            .map(|s| enricher.enrich(s))
            .collect();
        debug!("[POTA] Converted {} spots", spots.len());
        Ok(spots)
    }
}
