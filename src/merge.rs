//! # Merge, Dedup & Cross-Reference
//!
//! Combines every source's current snapshot into one ordered view:
//!
//! 1. **Dedup** within each source: one spot per `(station, band)`, the most
//!    recently observed wins (ties go to the later entry). The surviving spot
//!    keeps the position of the first entry for that key.
//! 2. **Cross-reference** parks (primary) against flora & fauna (secondary):
//!    the same station on the same frequency rounded to the nearest kHz is one
//!    activation. The primary spot is annotated with the secondary reference
//!    and label, and the matched secondary spot is not emitted on its own.
//! 3. **Order**: source order ([`SpotSource::ALL`]), then insertion order.
//!
//! The merge is a pure function of its inputs and can be re-run at any time.

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

use crate::spot::{Spot, SpotKey, SpotSource};

const PRIMARY: SpotSource = SpotSource::Pota;
const SECONDARY: SpotSource = SpotSource::Wwff;

/// Merges snapshots. Sources may appear in any order and any subset.
pub fn merge_sources<'a, I>(snapshots: I) -> Vec<Spot>
where
    I: IntoIterator<Item = (SpotSource, &'a [Spot])>,
{
    let mut per_source: HashMap<SpotSource, Vec<Spot>> = HashMap::new();
    for (source, spots) in snapshots {
        let deduped = dedup(spots);
        per_source.entry(source).or_default().extend(deduped);
    }

    let secondary_consumed = match (per_source.get(&PRIMARY), per_source.get(&SECONDARY)) {
        (Some(_), Some(_)) => cross_reference(&mut per_source),
        _ => HashSet::new(),
    };

    let mut merged = Vec::with_capacity(per_source.values().map(Vec::len).sum());
    for source in SpotSource::ALL {
        let Some(spots) = per_source.remove(&source) else {
            continue;
        };
        if source == SECONDARY {
            merged.extend(
                spots
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| !secondary_consumed.contains(i))
                    .map(|(_, s)| s),
            );
        } else {
            merged.extend(spots);
        }
    }
    crate::metrics::set_merged_view_size(merged.len() as f64);
    merged
}

/// One spot per `(station, band)`, latest `observed_at` wins.
pub fn dedup(spots: &[Spot]) -> Vec<Spot> {
    let mut kept: IndexMap<SpotKey, Spot> = IndexMap::with_capacity(spots.len());
    for spot in spots {
        let key = spot.key();
        match kept.get_mut(&key) {
            Some(existing) if existing.observed_at > spot.observed_at => {}
            Some(existing) => *existing = spot.clone(),
            None => {
                kept.insert(key, spot.clone());
            }
        }
    }
    kept.into_values().collect()
}

fn match_key(spot: &Spot) -> (String, i64) {
    (spot.station_id.clone(), spot.frequency_khz.round() as i64)
}

/// Annotates primaries in place; returns the indices of consumed secondaries.
fn cross_reference(per_source: &mut HashMap<SpotSource, Vec<Spot>>) -> HashSet<usize> {
    let mut lookup: HashMap<(String, i64), usize> = HashMap::new();
    if let Some(secondaries) = per_source.get(&SECONDARY) {
        for (i, spot) in secondaries.iter().enumerate() {
            lookup.entry(match_key(spot)).or_insert(i);
        }
    }
    let secondaries = per_source.get(&SECONDARY).cloned().unwrap_or_default();

    let mut consumed = HashSet::new();
    if let Some(primaries) = per_source.get_mut(&PRIMARY) {
        for primary in primaries.iter_mut() {
            if let Some(&i) = lookup.get(&match_key(primary)) {
                let secondary = &secondaries[i];
                primary.cross_reference = secondary.reference.clone();
                primary.cross_label = secondary.label.clone();
                consumed.insert(i);
            }
        }
    }
    consumed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn spot(source: SpotSource, call: &str, khz: f64, reference: &str) -> Spot {
        let mut s = Spot::new(source, call, khz, Utc::now());
        s.reference = Some(reference.to_string());
        s.label = Some(format!("{} label", reference));
        s
    }

    #[test]
    fn test_dedup_keeps_latest_in_first_position() {
        let now = Utc::now();
        let mut a = Spot::new(SpotSource::Cluster, "K1ABC", 14_025.0, now);
        let b = Spot::new(SpotSource::Cluster, "W1AW", 14_030.0, now);
        let mut a2 = Spot::new(SpotSource::Cluster, "K1ABC", 14_040.0, now + Duration::seconds(60));
        a.comment = "old".into();
        a2.comment = "new".into();
        let older = Spot::new(SpotSource::Cluster, "K1ABC", 14_010.0, now - Duration::seconds(60));

        let out = dedup(&[a, b, a2, older]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].station_id, "K1ABC");
        assert_eq!(out[0].comment, "new");
        assert_eq!(out[1].station_id, "W1AW");
    }

    #[test]
    fn test_cross_reference_within_rounding() {
        let pota = vec![spot(SpotSource::Pota, "K1ABC", 14_250.0, "US-0001")];
        let wwff = vec![spot(SpotSource::Wwff, "K1ABC", 14_250.4, "KFF-0001")];
        let merged = merge_sources([
            (SpotSource::Wwff, wwff.as_slice()),
            (SpotSource::Pota, pota.as_slice()),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source, SpotSource::Pota);
        assert_eq!(merged[0].cross_reference.as_deref(), Some("KFF-0001"));
        assert_eq!(merged[0].cross_label.as_deref(), Some("KFF-0001 label"));
    }

    #[test]
    fn test_cross_reference_miss_keeps_both() {
        let pota = vec![spot(SpotSource::Pota, "K1ABC", 14_250.0, "US-0001")];
        let wwff = vec![spot(SpotSource::Wwff, "K1ABC", 14_253.0, "KFF-0001")];
        let merged = merge_sources([
            (SpotSource::Pota, pota.as_slice()),
            (SpotSource::Wwff, wwff.as_slice()),
        ]);
        assert_eq!(merged.len(), 2);
        assert!(merged[0].cross_reference.is_none());
        assert_eq!(merged[1].source, SpotSource::Wwff);
    }

    #[test]
    fn test_source_then_insertion_order() {
        let cluster = vec![
            Spot::new(SpotSource::Cluster, "B1B", 7_025.0, Utc::now()),
            Spot::new(SpotSource::Cluster, "A1A", 7_030.0, Utc::now()),
        ];
        let sota = vec![spot(SpotSource::Sota, "Z1Z", 14_062.0, "W7A/AE-001")];
        let merged = merge_sources([
            (SpotSource::Cluster, cluster.as_slice()),
            (SpotSource::Sota, sota.as_slice()),
        ]);
        let calls: Vec<_> = merged.iter().map(|s| s.station_id.as_str()).collect();
        assert_eq!(calls, vec!["Z1Z", "B1B", "A1A"]);
    }

    #[test]
    fn test_idempotent() {
        let pota = vec![spot(SpotSource::Pota, "K1ABC", 14_250.0, "US-0001")];
        let wwff = vec![
            spot(SpotSource::Wwff, "K1ABC", 14_250.2, "KFF-0001"),
            spot(SpotSource::Wwff, "N0XYZ", 7_150.0, "KFF-0002"),
        ];
        let input = [
            (SpotSource::Pota, pota.as_slice()),
            (SpotSource::Wwff, wwff.as_slice()),
        ];
        let first = merge_sources(input);
        let second = merge_sources(input);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
