//! # Canonical Spot Model
//!
//! Every source, polled or streamed, ends up producing [`Spot`] values. This
//! module also holds the small normalization helpers shared by all sources:
//! mode normalization, mode keyword detection and comment cleanup.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

use crate::bands;

/// Where a spot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpotSource {
    /// Parks on the Air
    Pota,
    /// Summits on the Air
    Sota,
    /// World Wide Flora & Fauna
    Wwff,
    /// World Wide Bunkers on the Air
    Wwbota,
    /// DX cluster (telnet)
    Cluster,
    /// Reverse Beacon Network skimmers (telnet)
    Skimmer,
    /// Digital-mode reception network
    Digital,
}

impl SpotSource {
    /// Merge output order.
    pub const ALL: [SpotSource; 7] = [
        SpotSource::Pota,
        SpotSource::Sota,
        SpotSource::Wwff,
        SpotSource::Wwbota,
        SpotSource::Cluster,
        SpotSource::Skimmer,
        SpotSource::Digital,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpotSource::Pota => "pota",
            SpotSource::Sota => "sota",
            SpotSource::Wwff => "wwff",
            SpotSource::Wwbota => "wwbota",
            SpotSource::Cluster => "cluster",
            SpotSource::Skimmer => "skimmer",
            SpotSource::Digital => "digital",
        }
    }

    /// Sources that are fetched over HTTP on an interval.
    pub fn is_polled(&self) -> bool {
        !matches!(self, SpotSource::Cluster | SpotSource::Skimmer)
    }
}

impl fmt::Display for SpotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized activity report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spot {
    pub source: SpotSource,
    pub station_id: String,
    pub spotter: Option<String>,
    /// Maidenhead locator reported by the spotter, if any.
    pub spotter_grid: Option<String>,
    pub frequency_khz: f64,
    pub band: Option<&'static str>,
    pub mode: String,
    pub reference: Option<String>,
    pub label: Option<String>,
    /// Secondary program reference attached by the cross-reference pass.
    pub cross_reference: Option<String>,
    pub cross_label: Option<String>,
    pub comment: String,
    pub location_description: Option<String>,
    pub continent: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distance_km: Option<f64>,
    pub bearing_deg: Option<f64>,
    pub snr_db: Option<i32>,
    pub wpm: Option<u32>,
    pub spot_type: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl Spot {
    /// Builds a bare spot; the band is derived from the frequency.
    pub fn new(
        source: SpotSource,
        station_id: &str,
        frequency_khz: f64,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            station_id: normalize_station_id(station_id),
            spotter: None,
            spotter_grid: None,
            frequency_khz,
            band: bands::band_for_khz(frequency_khz),
            mode: String::new(),
            reference: None,
            label: None,
            cross_reference: None,
            cross_label: None,
            comment: String::new(),
            location_description: None,
            continent: None,
            latitude: None,
            longitude: None,
            distance_km: None,
            bearing_deg: None,
            snr_db: None,
            wpm: None,
            spot_type: None,
            observed_at,
        }
    }

    pub fn key(&self) -> SpotKey {
        SpotKey {
            station_id: self.station_id.clone(),
            band: self.band,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.observed_at)
    }
}

/// Raw feed records that convert into a canonical [`Spot`] before enrichment.
pub trait IntoSpot {
    fn into_spot(self) -> Spot;
}

/// Dedup key: one spot per station per band within a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpotKey {
    pub station_id: String,
    pub band: Option<&'static str>,
}

pub fn normalize_station_id(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Collapses the sideband variants and uppercases. Empty stays empty.
pub fn normalize_mode(raw: &str) -> String {
    let mode = raw.trim().to_ascii_uppercase();
    match mode.as_str() {
        "USB" | "LSB" | "SSB" | "PHONE" => "SSB".to_string(),
        _ => mode,
    }
}

static MODE_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(CW|FT8|FT4|RTTY|SSB|USB|LSB|FM)\b").expect("mode keyword regex")
});

/// Finds a mode keyword in free text, normalized.
pub fn mode_from_comment(comment: &str) -> Option<String> {
    MODE_KEYWORD
        .captures(comment)
        .and_then(|c| c.get(1))
        .map(|m| normalize_mode(m.as_str()))
}

/// Source mode if present, else a comment keyword, else the band plan.
pub fn resolve_mode(explicit: Option<&str>, comment: &str, frequency_khz: f64) -> String {
    if let Some(mode) = explicit.map(normalize_mode).filter(|m| !m.is_empty()) {
        return mode;
    }
    if let Some(mode) = mode_from_comment(comment) {
        return mode;
    }
    bands::infer_mode(frequency_khz)
        .map(str::to_string)
        .unwrap_or_default()
}

const MAX_COMMENT_LEN: usize = 120;

/// Strips control characters, collapses whitespace and bounds the length.
pub fn clean_comment(raw: &str) -> String {
    let collapsed = raw
        .split_whitespace()
        .map(|w| w.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if collapsed.chars().count() > MAX_COMMENT_LEN {
        collapsed.chars().take(MAX_COMMENT_LEN).collect()
    } else {
        collapsed
    }
}

/// Rebuilds a timestamp from an `HHMM` time of day on the UTC date of `now`.
pub fn time_of_day_today(hhmm: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if hhmm.len() != 4 || !hhmm.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour: u32 = hhmm[..2].parse().ok()?;
    let minute: u32 = hhmm[2..].parse().ok()?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let naive = now.date_naive().and_time(time);
    Some(Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_mode_normalization() {
        assert_eq!(normalize_mode("usb"), "SSB");
        assert_eq!(normalize_mode("LSB"), "SSB");
        assert_eq!(normalize_mode(" cw "), "CW");
        assert_eq!(normalize_mode(""), "");
    }

    #[test]
    fn test_mode_from_comment() {
        assert_eq!(mode_from_comment("tnx ft8 -10"), Some("FT8".to_string()));
        assert_eq!(mode_from_comment("QRV USB now"), Some("SSB".to_string()));
        // Embedded in a longer word must not match
        assert_eq!(mode_from_comment("CWOPS member"), None);
    }

    #[test]
    fn test_resolve_mode_order() {
        assert_eq!(resolve_mode(Some("usb"), "CW", 14_030.0), "SSB");
        assert_eq!(resolve_mode(None, "RTTY contest", 14_030.0), "RTTY");
        assert_eq!(resolve_mode(Some(""), "", 14_030.0), "CW");
        assert_eq!(resolve_mode(None, "", 9_000.0), "");
    }

    #[test]
    fn test_clean_comment() {
        assert_eq!(clean_comment("  CQ \t CQ\x07  test "), "CQ CQ test");
        let long = "x".repeat(500);
        assert_eq!(clean_comment(&long).len(), MAX_COMMENT_LEN);
    }

    #[test]
    fn test_time_of_day_today() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();
        let t = time_of_day_today("1234", now).unwrap();
        assert_eq!(t.date_naive(), now.date_naive());
        assert_eq!((t.hour(), t.minute()), (12, 34));
        assert!(time_of_day_today("2460", now).is_none());
        assert!(time_of_day_today("12a4", now).is_none());
    }

    #[test]
    fn test_spot_key_uses_band() {
        let now = Utc::now();
        let a = Spot::new(SpotSource::Cluster, "k1abc", 14_025.0, now);
        let b = Spot::new(SpotSource::Cluster, "K1ABC", 14_250.0, now);
        let c = Spot::new(SpotSource::Cluster, "K1ABC", 7_025.0, now);
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }
}
