//! # Spot Enrichment
//!
//! Fills the geographic fields of a [`Spot`] from the prefix resolver and
//! computes distance and bearing from the operator's home position.
//!
//! Coordinates already supplied by a source (park or summit positions) are
//! more precise than an entity centroid and are kept; the resolver still
//! supplies the location name and continent when the source did not.

use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::geo::{self, LatLon};
use crate::prefix_resolver::PrefixIndex;
use crate::spot::Spot;

/// Enricher handle swapped on reconfiguration (home position changes).
pub type SharedEnricher = Arc<ArcSwap<SpotEnricher>>;

#[derive(Debug, Clone)]
pub struct SpotEnricher {
    index: Arc<PrefixIndex>,
    home: Option<LatLon>,
}

impl SpotEnricher {
    pub fn new(index: Arc<PrefixIndex>, home: Option<LatLon>) -> Self {
        let home = home.filter(LatLon::is_valid);
        Self { index, home }
    }

    pub fn with_home(&self, home: Option<LatLon>) -> Self {
        Self::new(self.index.clone(), home)
    }

    pub fn home(&self) -> Option<LatLon> {
        self.home
    }

    pub fn index(&self) -> &Arc<PrefixIndex> {
        &self.index
    }

    pub fn shared(self) -> SharedEnricher {
        Arc::new(ArcSwap::from_pointee(self))
    }

    pub fn enrich(&self, mut spot: Spot) -> Spot {
        if let Some(entity) = self.index.resolve(&spot.station_id) {
            if spot.location_description.is_none() {
                spot.location_description = Some(entity.name.clone());
            }
            if spot.continent.is_none() {
                spot.continent = Some(entity.continent.clone());
            }
            if spot.latitude.is_none() || spot.longitude.is_none() {
                spot.latitude = Some(entity.latitude);
                spot.longitude = Some(entity.longitude);
            }
        }

        let target = match (spot.latitude, spot.longitude) {
            (Some(lat), Some(lon)) => Some(LatLon::new(lat, lon)).filter(LatLon::is_valid),
            _ => None,
        };
        if let (Some(home), Some(target)) = (self.home, target) {
            spot.distance_km = Some(geo::distance_km(home, target));
            spot.bearing_deg = Some(geo::bearing_deg(home, target));
        }
        spot
    }
}
