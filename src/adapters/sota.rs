// src/adapters/sota.rs
// Summits on the Air spots. The feed has no coordinates; they come from the
// SummitLocator, cached per summit reference.
//
// GET https://api2.sota.org.uk/api/spots/50/all returns an array of:
//   activatorCallsign, associationCode, summitCode, summitDetails,
//   frequency (MHz as string), mode, comments, callsign (spotter), timeStamp

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Deserialize;
use std::sync::Arc;

use crate::enrichment::SpotEnricher;
use crate::source_adapter::{
    decode_each, fetch_json_elements, number_field, parse_endpoint_url, parse_utc_timestamp,
    SourceError, SpotSourceAdapter,
};
use crate::spot::{clean_comment, resolve_mode, Spot, SpotSource};
use crate::summit_locator::SummitLocator;

pub const DEFAULT_URL: &str = "https://api2.sota.org.uk/api/spots/50/all";
pub const DEFAULT_SUMMIT_URL: &str = "https://api2.sota.org.uk/api/summits";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SotaSpot {
    activator_callsign: String,
    association_code: Option<String>,
    summit_code: Option<String>,
    summit_details: Option<String>,
    #[serde(default)]
    frequency: serde_json::Value,
    mode: Option<String>,
    comments: Option<String>,
    callsign: Option<String>,
    time_stamp: Option<String>,
}

impl SotaSpot {
    fn summit_ref(&self) -> Option<String> {
        let association = self.association_code.as_deref()?.trim();
        let code = self.summit_code.as_deref()?.trim();
        if association.is_empty() || code.is_empty() {
            return None;
        }
        Some(format!("{}/{}", association, code))
    }

    fn to_spot(&self, now: DateTime<Utc>) -> Option<Spot> {
        let mhz = number_field(&self.frequency).filter(|f| *f > 0.0)?;
        if self.activator_callsign.trim().is_empty() {
            return None;
        }
        let khz = mhz * 1000.0;
        let observed_at = self
            .time_stamp
            .as_deref()
            .and_then(parse_utc_timestamp)
            .unwrap_or(now);
        let comment = clean_comment(self.comments.as_deref().unwrap_or_default());

        let mut spot = Spot::new(SpotSource::Sota, &self.activator_callsign, khz, observed_at);
        spot.mode = resolve_mode(self.mode.as_deref(), &comment, khz);
        spot.comment = comment;
        spot.spotter = self.callsign.clone().filter(|s| !s.is_empty());
        spot.reference = self.summit_ref();
        spot.label = self.summit_details.clone().filter(|s| !s.is_empty());
        Some(spot)
    }
}

pub struct SotaAdapter {
    client: reqwest::Client,
    url: url::Url,
    locator: Arc<SummitLocator>,
}

impl SotaAdapter {
    pub fn new(
        client: reqwest::Client,
        url: &str,
        locator: Arc<SummitLocator>,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            client,
            url: parse_endpoint_url(url)?,
            locator,
        })
    }
}

#[async_trait]
impl SpotSourceAdapter for SotaAdapter {
    fn name(&self) -> &'static str {
        "SOTA"
    }

    fn source(&self) -> SpotSource {
        SpotSource::Sota
    }

    async fn fetch_spots(&self, enricher: &SpotEnricher) -> Result<Vec<Spot>, SourceError> {
        let items = fetch_json_elements(&self.client, &self.url, None).await?;
        let now = Utc::now();
        let mut spots: Vec<Spot> = decode_each::<SotaSpot>(self.name(), items)
            .iter()
            .filter_map(|s| s.to_spot(now))
            .collect();

        let positions = self
            .locator
            .locate_all(spots.iter().filter_map(|s| s.reference.as_deref()))
            .await;
        for spot in &mut spots {
            if let Some(pos) = spot.reference.as_ref().and_then(|r| positions.get(r)) {
                spot.latitude = Some(pos.latitude);
                spot.longitude = Some(pos.longitude);
            }
        }

        let spots: Vec<Spot> = spots.into_iter().map(|s| enricher.enrich(s)).collect();
        debug!("[SOTA] Converted {} spots", spots.len());
        Ok(spots)
    }
}
