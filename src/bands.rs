//! # Bands and Band Plan
//!
//! Static amateur band edges (160m through 2m) and the per-band sub-band plan
//! used to infer a mode when a report does not carry one.
//!
//! The sub-band plan follows the widely published IARU/ARRL conventions: a CW
//! segment at the bottom of each band, a narrow digital segment just above it,
//! and phone for the rest of the band.

/// An amateur band with its edges in kHz (inclusive).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub name: &'static str,
    pub lower_khz: f64,
    pub upper_khz: f64,
}

impl Band {
    pub const fn new(lower_khz: f64, upper_khz: f64, name: &'static str) -> Self {
        Self {
            name,
            lower_khz,
            upper_khz,
        }
    }

    pub fn contains(&self, khz: f64) -> bool {
        khz >= self.lower_khz && khz <= self.upper_khz
    }
}

pub const BANDS: &[Band] = &[
    Band::new(1_800.0, 2_000.0, "160m"),
    Band::new(3_500.0, 4_000.0, "80m"),
    Band::new(5_330.0, 5_410.0, "60m"),
    Band::new(7_000.0, 7_300.0, "40m"),
    Band::new(10_100.0, 10_150.0, "30m"),
    Band::new(14_000.0, 14_350.0, "20m"),
    Band::new(18_068.0, 18_168.0, "17m"),
    Band::new(21_000.0, 21_450.0, "15m"),
    Band::new(24_890.0, 24_990.0, "12m"),
    Band::new(28_000.0, 29_700.0, "10m"),
    Band::new(50_000.0, 54_000.0, "6m"),
    Band::new(70_000.0, 70_500.0, "4m"),
    Band::new(144_000.0, 148_000.0, "2m"),
];

/// Returns the band name for a frequency in kHz, if it falls inside one.
pub fn band_for_khz(khz: f64) -> Option<&'static str> {
    if !khz.is_finite() {
        return None;
    }
    BANDS.iter().find(|b| b.contains(khz)).map(|b| b.name)
}

/// Sub-band plan for one band: `(upper_khz, mode)` segments in ascending
/// order, each running up to its exclusive upper edge. Frequencies past the
/// last segment use `rest`.
#[derive(Debug, Clone, Copy)]
struct BandPlan {
    band: &'static str,
    segments: &'static [(f64, &'static str)],
    rest: &'static str,
}

const BAND_PLAN: &[BandPlan] = &[
    BandPlan { band: "160m", segments: &[(1_840.0, "CW"), (1_843.0, "FT8")], rest: "SSB" },
    BandPlan { band: "80m", segments: &[(3_570.0, "CW"), (3_600.0, "FT8")], rest: "SSB" },
    BandPlan { band: "60m", segments: &[(5_351.5, "CW"), (5_354.0, "FT8")], rest: "SSB" },
    BandPlan { band: "40m", segments: &[(7_040.0, "CW"), (7_080.0, "FT8")], rest: "SSB" },
    // 30m has no phone allocation: everything above CW is digital.
    BandPlan { band: "30m", segments: &[(10_130.0, "CW")], rest: "FT8" },
    BandPlan { band: "20m", segments: &[(14_070.0, "CW"), (14_100.0, "FT8")], rest: "SSB" },
    BandPlan { band: "17m", segments: &[(18_095.0, "CW"), (18_110.0, "FT8")], rest: "SSB" },
    BandPlan { band: "15m", segments: &[(21_070.0, "CW"), (21_110.0, "FT8")], rest: "SSB" },
    BandPlan { band: "12m", segments: &[(24_915.0, "CW"), (24_930.0, "FT8")], rest: "SSB" },
    BandPlan { band: "10m", segments: &[(28_070.0, "CW"), (28_300.0, "FT8")], rest: "SSB" },
    // VHF digital windows sit above the weak-signal SSB segment.
    BandPlan {
        band: "6m",
        segments: &[(50_100.0, "CW"), (50_300.0, "SSB"), (50_350.0, "FT8"), (51_000.0, "SSB")],
        rest: "FM",
    },
    BandPlan {
        band: "4m",
        segments: &[(70_100.0, "CW"), (70_150.0, "SSB"), (70_200.0, "FT8"), (70_250.0, "SSB")],
        rest: "FM",
    },
    BandPlan {
        band: "2m",
        segments: &[(144_100.0, "CW"), (144_170.0, "SSB"), (144_180.0, "FT8"), (144_500.0, "SSB")],
        rest: "FM",
    },
];

/// Infers a mode from frequency using the band plan.
///
/// Returns `None` when the frequency is outside every known band.
pub fn infer_mode(khz: f64) -> Option<&'static str> {
    let band = band_for_khz(khz)?;
    let plan = BAND_PLAN.iter().find(|p| p.band == band)?;
    let mode = plan
        .segments
        .iter()
        .find(|(upper_khz, _)| khz < *upper_khz)
        .map_or(plan.rest, |(_, mode)| *mode);
    Some(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_lookup() {
        assert_eq!(band_for_khz(14_025.0), Some("20m"));
        assert_eq!(band_for_khz(1_800.0), Some("160m"));
        assert_eq!(band_for_khz(146_520.0), Some("2m"));
        assert_eq!(band_for_khz(12_000.0), None);
        assert_eq!(band_for_khz(f64::NAN), None);
    }

    #[test]
    fn test_mode_inference_20m() {
        assert_eq!(infer_mode(14_030.0), Some("CW"));
        assert_eq!(infer_mode(14_072.0), Some("FT8"));
        assert_eq!(infer_mode(14_200.0), Some("SSB"));
    }

    #[test]
    fn test_mode_inference_edges() {
        // Segment upper edges belong to the next segment up.
        assert_eq!(infer_mode(14_070.0), Some("FT8"));
        assert_eq!(infer_mode(14_100.0), Some("SSB"));
        assert_eq!(infer_mode(10_136.0), Some("FT8"));
        assert_eq!(infer_mode(9_000.0), None);
    }

    #[test]
    fn test_vhf_digital_windows() {
        assert_eq!(infer_mode(50_313.0), Some("FT8"));
        assert_eq!(infer_mode(50_050.0), Some("CW"));
        assert_eq!(infer_mode(50_150.0), Some("SSB"));
        assert_eq!(infer_mode(70_154.0), Some("FT8"));
        assert_eq!(infer_mode(144_174.0), Some("FT8"));
        assert_eq!(infer_mode(144_300.0), Some("SSB"));
        assert_eq!(infer_mode(146_520.0), Some("FM"));
    }

    #[test]
    fn test_segments_ascend() {
        for plan in BAND_PLAN {
            assert!(plan.segments.windows(2).all(|w| w[0].0 < w[1].0), "{}", plan.band);
        }
    }

    #[test]
    fn test_every_band_has_a_plan() {
        for band in BANDS {
            assert!(
                BAND_PLAN.iter().any(|p| p.band == band.name),
                "missing band plan for {}",
                band.name
            );
        }
    }
}
