//! # Skimmer Feed Parser
//!
//! Skimmer spots carry a structured comment:
//!
//! ```text
//! CW 24 dB 22 WPM CQ
//! FT8 -12 dB CQ
//! ```
//!
//! Mode, signal-to-noise ratio, keying speed and spot type are extracted from
//! that pattern. A comment in any other layout keeps an empty mode. Only
//! targets in the operator's watch set are surfaced; the rest of the feed is
//! dropped here.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::dx_line::parse_dx_line;
use crate::spot::{clean_comment, normalize_mode, IntoSpot, Spot, SpotSource};
use crate::stream_client::LineParser;
use crate::watch_list::SharedWatchSet;

static SKIMMER_COMMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([A-Z0-9]+)\s+([+-]?\d+)\s*dB(?:\s+(\d+)\s*(?:WPM|BPS))?(?:\s+([A-Z][A-Z ]*?))?\s*$")
        .expect("skimmer comment regex")
});

#[derive(Debug, Clone, PartialEq)]
pub struct SkimmerRecord {
    pub spotter: String,
    pub station_id: String,
    pub frequency_khz: f64,
    pub mode: String,
    pub snr_db: Option<i32>,
    pub wpm: Option<u32>,
    pub spot_type: Option<String>,
    pub comment: String,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkimmerComment {
    pub mode: String,
    pub snr_db: Option<i32>,
    pub wpm: Option<u32>,
    pub spot_type: Option<String>,
}

pub fn parse_skimmer_comment(comment: &str) -> SkimmerComment {
    let Some(caps) = SKIMMER_COMMENT.captures(comment.trim()) else {
        return SkimmerComment::default();
    };
    SkimmerComment {
        mode: caps.get(1).map(|m| normalize_mode(m.as_str())).unwrap_or_default(),
        snr_db: caps.get(2).and_then(|m| m.as_str().parse().ok()),
        wpm: caps.get(3).and_then(|m| m.as_str().parse().ok()),
        spot_type: caps
            .get(4)
            .map(|m| m.as_str().trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty()),
    }
}

pub struct SkimmerParser {
    watch: SharedWatchSet,
}

impl SkimmerParser {
    pub fn new(watch: SharedWatchSet) -> Self {
        Self { watch }
    }

    pub fn parse_at(&self, line: &str, now: DateTime<Utc>) -> Option<SkimmerRecord> {
        let dx = parse_dx_line(line, now)?;
        if !self.watch.load().contains(&dx.station_id) {
            return None;
        }
        let comment = clean_comment(&dx.comment);
        let parsed = parse_skimmer_comment(&comment);
        Some(SkimmerRecord {
            spotter: dx.spotter_display().to_string(),
            station_id: dx.station_id,
            frequency_khz: dx.frequency_khz,
            mode: parsed.mode,
            snr_db: parsed.snr_db,
            wpm: parsed.wpm,
            spot_type: parsed.spot_type,
            comment,
            observed_at: dx.observed_at,
        })
    }
}

impl LineParser for SkimmerParser {
    type Record = SkimmerRecord;

    fn parse_line(&self, line: &str) -> Option<SkimmerRecord> {
        self.parse_at(line, Utc::now())
    }
}

impl IntoSpot for SkimmerRecord {
    fn into_spot(self) -> Spot {
        let mut spot = Spot::new(
            SpotSource::Skimmer,
            &self.station_id,
            self.frequency_khz,
            self.observed_at,
        );
        spot.spotter = Some(self.spotter);
        spot.mode = self.mode;
        spot.snr_db = self.snr_db;
        spot.wpm = self.wpm;
        spot.spot_type = self.spot_type;
        spot.comment = self.comment;
        spot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch_list::WatchSet;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap()
    }

    fn parser() -> SkimmerParser {
        SkimmerParser::new(WatchSet::new(Some("N0CALL"), ["K1ABC"]).shared())
    }

    #[test]
    fn test_full_comment() {
        let c = parse_skimmer_comment("CW 24 dB 22 WPM CQ");
        assert_eq!(c.mode, "CW");
        assert_eq!(c.snr_db, Some(24));
        assert_eq!(c.wpm, Some(22));
        assert_eq!(c.spot_type.as_deref(), Some("CQ"));
    }

    #[test]
    fn test_comment_without_wpm() {
        let c = parse_skimmer_comment("FT8 -12 dB CQ");
        assert_eq!(c.mode, "FT8");
        assert_eq!(c.snr_db, Some(-12));
        assert_eq!(c.wpm, None);
        assert_eq!(c.spot_type.as_deref(), Some("CQ"));

        let c = parse_skimmer_comment("RTTY +5 dB 45 BPS");
        assert_eq!(c.mode, "RTTY");
        assert_eq!(c.wpm, Some(45));
        assert_eq!(c.spot_type, None);
    }

    #[test]
    fn test_other_layout_degrades_to_empty_mode() {
        let c = parse_skimmer_comment("CQ 22 WPM CW 24 dB");
        assert_eq!(c, SkimmerComment::default());
        assert_eq!(parse_skimmer_comment("").mode, "");
    }

    #[test]
    fn test_watch_set_filter() {
        let p = parser();
        let line = "DX de W3LPL-#: 14025.0 K1ABC CW 24 dB 22 WPM CQ 1234Z";
        let rec = p.parse_at(line, now()).unwrap();
        assert_eq!(rec.spotter, "W3LPL");
        assert_eq!(rec.snr_db, Some(24));

        let line = "DX de W3LPL-#: 14025.0 DL1XYZ CW 24 dB 22 WPM CQ 1234Z";
        assert!(p.parse_at(line, now()).is_none());
        // Portable variants are a different identifier
        let line = "DX de W3LPL-#: 14025.0 K1ABC/P CW 24 dB 22 WPM CQ 1234Z";
        assert!(p.parse_at(line, now()).is_none());
    }

    #[test]
    fn test_record_into_spot() {
        let line = "DX de W3LPL-#: 7025.0 N0CALL CW 9 dB 18 WPM CQ 1234Z";
        let spot = parser().parse_at(line, now()).unwrap().into_spot();
        assert_eq!(spot.source, SpotSource::Skimmer);
        assert_eq!(spot.band, Some("40m"));
        assert_eq!(spot.wpm, Some(18));
        assert_eq!(spot.spot_type.as_deref(), Some("CQ"));
    }
}
