// src/adapters/wwbota.rs
// World Wide Bunkers on the Air spots.
//
// GET https://api.wwbota.org/spots/ returns an array of:
//   call, freq (MHz number), mode, comment, time (RFC 3339), spotter,
//   references: [{reference, name, lat, long}]

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

pub const DEFAULT_URL: &str = "https://api.wwbota.org/spots/";

#[derive(Debug, Deserialize)]
struct BunkerRef {
    reference: String,
    name: Option<String>,
    lat: Option<f64>,
    long: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WwbotaSpot {
    call: String,
    #[serde(default)]
    freq: serde_json::Value,
    mode: Option<String>,
    comment: Option<String>,
    time: Option<String>,
    spotter: Option<String>,
    #[serde(default)]
    references: Vec<BunkerRef>,
}

impl WwbotaSpot {
    fn to_spot(&self, now: DateTime<Utc>) -> Option<Spot> {
        let mhz = number_field(&self.freq).filter(|f| *f > 0.0)?;
        if self.call.trim().is_empty() {
            return None;
        }
        let khz = mhz * 1000.0;
        let observed_at = self
            .time
            .as_deref()
            .and_then(parse_utc_timestamp)
            .unwrap_or(now);
        let comment = clean_comment(self.comment.as_deref().unwrap_or_default());

        let mut spot = Spot::new(SpotSource::Wwbota, &self.call, khz, observed_at);
        spot.mode = resolve_mode(self.mode.as_deref(), &comment, khz);
        spot.comment = comment;
        spot.spotter = self.spotter.clone().filter(|s| !s.is_empty());
        if let Some(bunker) = self.references.first() {
            spot.reference = Some(bunker.reference.clone());
            spot.label = bunker.name.clone().filter(|s| !s.is_empty());
            spot.latitude = bunker.lat;
            spot.longitude = bunker.long;
        }
        Some(spot)
    }
}

pub struct WwbotaAdapter {
    client: reqwest::Client,
    url: url::Url,
}

impl WwbotaAdapter {
    pub fn new(client: reqwest::Client, url: &str) -> Result<Self, SourceError> {
        Ok(Self {
            client,
            url: parse_endpoint_url(url)?,
        })
    }
}

#[async_trait]
impl SpotSourceAdapter for WwbotaAdapter {
    fn name(&self) -> &'static str {
        "WWBOTA"
    }

    fn source(&self) -> SpotSource {
        SpotSource::Wwbota
    }

    async fn fetch_spots(&self, enricher: &SpotEnricher) -> Result<Vec<Spot>, SourceError> {
        let items = fetch_json_elements(&self.client, &self.url, None).await?;
        let now = Utc::now();
        let spots: Vec<Spot> = decode_each::<WwbotaSpot>(self.name(), items)
            .iter()
            .filter_map(|s| s.to_spot(now))
            .map(|s| enricher.enrich(s))
            .collect();
        debug!("[WWBOTA] Converted {} spots", spots.len());
        Ok(spots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_adapter::json_elements;

    #[test]
    fn test_conversion_uses_first_reference() {
        let body = r#"[
            {"call": "m0abc", "freq": 7.118, "mode": "SSB", "comment": "cq bunkers",
             "time": "2024-06-01T12:34:56Z", "spotter": "G0XYZ",
             "references": [
                {"reference": "B/G-0001", "name": "Pillbox", "lat": 51.5, "long": -0.1},
                {"reference": "B/G-0002", "name": "Other"}
             ]},
            {"call": "M0NOREF", "freq": 14.060, "mode": "", "comment": "", "references": []}
        ]"#;
        let spots: Vec<Spot> = decode_each::<WwbotaSpot>("WWBOTA", json_elements(body, None).unwrap())
            .iter()
            .filter_map(|s| s.to_spot(Utc::now()))
            .collect();
        assert_eq!(spots.len(), 2);
        let a = &spots[0];
        assert_eq!(a.station_id, "M0ABC");
        assert!((a.frequency_khz - 7_118.0).abs() < 1e-6);
        assert_eq!(a.reference.as_deref(), Some("B/G-0001"));
        assert_eq!(a.label.as_deref(), Some("Pillbox"));
        assert_eq!(a.longitude, Some(-0.1));

        let b = &spots[1];
        assert!(b.reference.is_none());
        assert_eq!(b.mode, "CW");
    }
}
