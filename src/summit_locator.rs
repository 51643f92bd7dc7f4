//! # Summit Locator
//!
//! Secondary lookup for summit spots, which arrive without coordinates.
//! Coordinates are fetched once per summit reference and cached for the life
//! of the process. A failed lookup caches "no data" so the same summit is not
//! retried every polling cycle. Uncached references are fetched concurrently,
//! at most `concurrency` at a time.

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use log::{debug, info};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

use crate::geo::LatLon;
use crate::metrics;

pub const DEFAULT_LOOKUP_CONCURRENCY: usize = 20;
const CACHE_NAME: &str = "summit_locator";

#[derive(Debug, Deserialize)]
struct SummitDocument {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

pub struct SummitLocator {
    client: reqwest::Client,
    base_url: String,
    concurrency: usize,
    cache: DashMap<String, Option<LatLon>>,
}

impl SummitLocator {
    /// `base_url` is the summit endpoint root, e.g.
    /// `https://api2.sota.org.uk/api/summits`.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, concurrency: usize) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            concurrency: concurrency.max(1),
            cache: DashMap::new(),
        }
    }

    /// Cached entry: `None` if never looked up, `Some(None)` if the lookup
    /// found nothing.
    pub fn cached(&self, summit_ref: &str) -> Option<Option<LatLon>> {
        self.cache.get(summit_ref).map(|entry| *entry.value())
    }

    pub fn insert_cached(&self, summit_ref: &str, position: Option<LatLon>) {
        self.cache.insert(summit_ref.to_string(), position);
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Resolves every reference, fetching only the ones not cached yet.
    pub async fn locate_all<'a, I>(&self, refs: I) -> HashMap<String, LatLon>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let unique: HashSet<&str> = refs.into_iter().filter(|r| !r.is_empty()).collect();

        let mut missing = Vec::new();
        for summit_ref in &unique {
            if self.cache.contains_key(*summit_ref) {
                metrics::increment_cache_hit(CACHE_NAME);
            } else {
                metrics::increment_cache_miss(CACHE_NAME);
                missing.push(summit_ref.to_string());
            }
        }

        if !missing.is_empty() {
            let fetched: Vec<(String, Option<LatLon>)> = stream::iter(missing)
                .map(|summit_ref| {
                    let client = self.client.clone();
                    let base_url = self.base_url.clone();
                    async move {
                        let position = fetch_summit(&client, &base_url, &summit_ref).await;
                        (summit_ref, position)
                    }
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            let found = fetched.iter().filter(|(_, p)| p.is_some()).count();
            info!(
                "🏔️ [SummitLocator] Looked up {} summits ({} with coordinates)",
                fetched.len(),
                found
            );
            for (summit_ref, position) in fetched {
                self.cache.insert(summit_ref, position);
            }
        }

        unique
            .into_iter()
            .filter_map(|r| self.cached(r).flatten().map(|p| (r.to_string(), p)))
            .collect()
    }
}

async fn fetch_summit(client: &reqwest::Client, base_url: &str, summit_ref: &str) -> Option<LatLon> {
    let (association, code) = split_summit_ref(summit_ref)?;
    let url = format!("{}/{}/{}", base_url, association, code);
    let response = match client.get(&url).send().await {
        Ok(r) => r,
        Err(e) => {
            debug!("[SummitLocator] Lookup {} failed: {}", summit_ref, e);
            return None;
        }
    };
    let doc: SummitDocument = match response.error_for_status() {
        Ok(r) => match r.json().await {
            Ok(doc) => doc,
            Err(e) => {
                debug!("[SummitLocator] Bad document for {}: {}", summit_ref, e);
                return None;
            }
        },
        Err(e) => {
            debug!("[SummitLocator] Lookup {} rejected: {}", summit_ref, e);
            return None;
        }
    };
    match (doc.latitude, doc.longitude) {
        (Some(lat), Some(lon)) => Some(LatLon::new(lat, lon)).filter(LatLon::is_valid),
        _ => None,
    }
}

/// Splits `W7A/AE-001` into association `W7A` and summit code `AE-001`.
pub fn split_summit_ref(summit_ref: &str) -> Option<(&str, &str)> {
    let (association, code) = summit_ref.trim().split_once('/')?;
    if association.is_empty() || code.is_empty() || code.contains('/') {
        return None;
    }
    Some((association, code))
}
