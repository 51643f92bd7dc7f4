//! # `DX de` Line Tokenizer
//!
//! Both live feeds speak the classic cluster spot line:
//!
//! ```text
//! DX de W3LPL-#:   14025.0  K1ABC        CW 24 dB 22 WPM CQ      1234Z FN20
//! ```
//!
//! The tokenizer splits out the reporting station, frequency (kHz), target
//! station, free-text comment, `HHMM` time of day and an optional trailing
//! grid square. Anything else (announcements, talk, prompts) is rejected.

use chrono::{DateTime, Utc};

use crate::spot::{normalize_station_id, time_of_day_today};

const DX_PREFIX: &str = "DX de ";

/// One tokenized spot line.
#[derive(Debug, Clone, PartialEq)]
pub struct DxLine {
    /// Reporting station as sent, skimmer suffix included (`W3LPL-#`).
    pub spotter: String,
    pub frequency_khz: f64,
    pub station_id: String,
    pub comment: String,
    pub observed_at: DateTime<Utc>,
    pub grid: Option<String>,
}

impl DxLine {
    /// Reporting station without skimmer suffixes (`-#`, `-1`, `-2`...).
    pub fn spotter_display(&self) -> &str {
        match self.spotter.rsplit_once('-') {
            Some((call, suffix))
                if !call.is_empty()
                    && (suffix == "#" || suffix.chars().all(|c| c.is_ascii_digit())) =>
            {
                call
            }
            _ => &self.spotter,
        }
    }
}

/// Parses a spot line, using `now` to date the `HHMM` time of day.
pub fn parse_dx_line(line: &str, now: DateTime<Utc>) -> Option<DxLine> {
    let line = line.trim();
    let head = line.get(..DX_PREFIX.len())?;
    if !head.eq_ignore_ascii_case(DX_PREFIX) {
        return None;
    }
    let rest = &line[DX_PREFIX.len()..];
    let (spotter, body) = rest.split_once(':')?;
    let spotter = normalize_station_id(spotter);
    if spotter.is_empty() || spotter.contains(char::is_whitespace) {
        return None;
    }

    let tokens: Vec<&str> = body.split_whitespace().collect();
    if tokens.len() < 3 {
        return None;
    }
    let frequency_khz: f64 = tokens[0].parse().ok()?;
    if !frequency_khz.is_finite() || frequency_khz <= 0.0 {
        return None;
    }
    let station_id = normalize_station_id(tokens[1]);
    if !is_plausible_station(&station_id) {
        return None;
    }

    // The time token is the last HHMMZ; at most a grid follows it.
    let time_idx = tokens
        .iter()
        .rposition(|t| is_time_token(t))
        .filter(|&i| i >= 2 && tokens.len() - i <= 2)?;
    let hhmm = &tokens[time_idx][..4];
    let observed_at = time_of_day_today(hhmm, now)?;

    let comment = tokens[2..time_idx].join(" ");
    let grid = tokens.get(time_idx + 1).map(|g| g.to_ascii_uppercase());

    Some(DxLine {
        spotter,
        frequency_khz,
        station_id,
        comment,
        observed_at,
        grid,
    })
}

fn is_time_token(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() == 5
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && (bytes[4] == b'Z' || bytes[4] == b'z')
}

fn is_plausible_station(call: &str) -> bool {
    call.len() >= 3
        && call.chars().any(|c| c.is_ascii_digit())
        && call
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '/')
}
