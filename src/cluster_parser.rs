// src/cluster_parser.rs
// DX cluster feed: spot lines with the mode taken from the comment or the band plan.

use chrono::{DateTime, Utc};
use log::debug;

use crate::dx_line::parse_dx_line;
use crate::spot::{clean_comment, resolve_mode, IntoSpot, Spot, SpotSource};
use crate::stream_client::LineParser;

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRecord {
    pub spotter: String,
    pub station_id: String,
    pub frequency_khz: f64,
    pub mode: String,
    pub comment: String,
    pub grid: Option<String>,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct ClusterParser;

impl ClusterParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_at(&self, line: &str, now: DateTime<Utc>) -> Option<ClusterRecord> {
        let dx = parse_dx_line(line, now)?;
        let comment = clean_comment(&dx.comment);
        let mode = resolve_mode(None, &comment, dx.frequency_khz);
        Some(ClusterRecord {
            spotter: dx.spotter_display().to_string(),
            station_id: dx.station_id,
            frequency_khz: dx.frequency_khz,
            mode,
            comment,
            grid: dx.grid,
            observed_at: dx.observed_at,
        })
    }
}

impl LineParser for ClusterParser {
    type Record = ClusterRecord;

    fn parse_line(&self, line: &str) -> Option<ClusterRecord> {
        let record = self.parse_at(line, Utc::now());
        if record.is_none() {
            debug!("[ClusterParser] Dropped line: {}", line);
        }
        record
    }
}

impl IntoSpot for ClusterRecord {
    fn into_spot(self) -> Spot {
        let mut spot = Spot::new(
            SpotSource::Cluster,
            &self.station_id,
            self.frequency_khz,
            self.observed_at,
        );
        spot.spotter = Some(self.spotter);
        spot.spotter_grid = self.grid;
        spot.mode = self.mode;
        spot.comment = self.comment;
        spot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap()
    }

    #[test]
    fn test_basic_line_to_spot() {
        let rec = ClusterParser::new()
            .parse_at("DX de W1AW: 14025.0 K1ABC CQ 1234Z", now())
            .unwrap();
        let spot = rec.into_spot();
        assert_eq!(spot.station_id, "K1ABC");
        assert_eq!(spot.frequency_khz, 14_025.0);
        assert_eq!(spot.band, Some("20m"));
        assert_eq!(spot.mode, "CW");
        assert_eq!((spot.observed_at.hour(), spot.observed_at.minute()), (12, 34));
        assert_eq!(spot.spotter.as_deref(), Some("W1AW"));
    }

    #[test]
    fn test_spotter_grid_is_carried() {
        let spot = ClusterParser::new()
            .parse_at("DX de W1AW: 7025.0 K1ABC CQ 1234Z fn31", now())
            .unwrap()
            .into_spot();
        assert_eq!(spot.spotter_grid.as_deref(), Some("FN31"));
        assert_eq!(spot.comment, "CQ");

        let spot = ClusterParser::new()
            .parse_at("DX de W1AW: 7025.0 K1ABC CQ 1234Z", now())
            .unwrap()
            .into_spot();
        assert!(spot.spotter_grid.is_none());
    }

    #[test]
    fn test_comment_keyword_beats_band_plan() {
        let p = ClusterParser::new();
        let rec = p.parse_at("DX de W1AW: 14025.0 K1ABC FT4 up 2 0900Z", now()).unwrap();
        assert_eq!(rec.mode, "FT4");
        let rec = p.parse_at("DX de W1AW: 14030.0 K1ABC lsb?? 0900Z", now()).unwrap();
        // "lsb??" still has a word boundary after the keyword
        assert_eq!(rec.mode, "SSB");
    }

    #[test]
    fn test_band_plan_inference() {
        let p = ClusterParser::new();
        let mode = |khz: &str| {
            p.parse_at(&format!("DX de W1AW: {} K1ABC tnx 0900Z", khz), now())
                .unwrap()
                .mode
        };
        assert_eq!(mode("14072.0"), "FT8");
        assert_eq!(mode("14030.0"), "CW");
        assert_eq!(mode("14200.0"), "SSB");
    }

    #[test]
    fn test_noise_is_dropped() {
        let p = ClusterParser::new();
        assert!(p.parse_line("WWV de VE7CC <18>:   SFI=150, A=5, K=1").is_none());
        assert!(p.parse_line("N0CALL de DXCLUSTER >").is_none());
    }
}
