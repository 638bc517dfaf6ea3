//! Attraction Index
//!
//! Holds the static attraction catalog and answers proximity queries.
//! Built once at startup and shared read-only between workers.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::distance::{distance_miles, Coordinate};
use crate::error::{Error, Result};

/// A named point of interest with fixed coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attraction {
    pub attraction_id: Uuid,
    pub attraction_name: String,
    pub city: String,
    pub state: String,
    #[serde(flatten)]
    pub location: Coordinate,
    /// Base points hint; the rewards oracle has the final word
    #[serde(default)]
    pub base_reward_points: i32,
}

impl Attraction {
    pub fn new(
        attraction_name: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        let attraction_name = attraction_name.into();
        let city = city.into();
        let state = state.into();
        let location = Coordinate::new(latitude, longitude);
        Self {
            attraction_id: derive_attraction_id(&attraction_name, &city, &state, location),
            attraction_name,
            city,
            state,
            location,
            base_reward_points: 0,
        }
    }

    pub fn with_base_points(mut self, points: i32) -> Self {
        self.base_reward_points = points;
        self
    }
}

/// Stable id for catalogs that do not carry one. Same-named attractions
/// elsewhere get distinct ids.
fn derive_attraction_id(name: &str, city: &str, state: &str, location: Coordinate) -> Uuid {
    let key = format!(
        "{}|{}|{}|{}|{}",
        name, city, state, location.latitude, location.longitude
    );
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}

/// An attraction paired with its distance to a query point
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttractionDistance {
    pub attraction: Attraction,
    pub distance_miles: f64,
}

/// Read-only index over the attraction catalog
#[derive(Debug, Clone, Default)]
pub struct AttractionIndex {
    attractions: Vec<Attraction>,
}

impl AttractionIndex {
    /// Builds the index, rejecting a catalog where two attractions share an id
    pub fn new(attractions: Vec<Attraction>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(attractions.len());
        for attraction in &attractions {
            if !seen.insert(attraction.attraction_id) {
                return Err(Error::InvalidConfig {
                    key: "ATTRACTIONS_FILE",
                    message: format!(
                        "duplicate attraction id {} ({})",
                        attraction.attraction_id, attraction.attraction_name
                    )
                    .into(),
                });
            }
        }
        Ok(Self { attractions })
    }

    /// All attractions in catalog order
    pub fn all(&self) -> &[Attraction] {
        &self.attractions
    }

    pub fn len(&self) -> usize {
        self.attractions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attractions.is_empty()
    }

    /// The `n` attractions closest to `point`, nearest first.
    ///
    /// Ties keep catalog order. `n` larger than the catalog returns the whole
    /// catalog; a negative `n` is rejected.
    pub fn nearest_attractions(&self, point: Coordinate, n: i64) -> Result<Vec<AttractionDistance>> {
        if n < 0 {
            return Err(Error::invalid_argument(format!(
                "attraction count must be >= 0, got {}",
                n
            )));
        }
        let n = usize::try_from(n).unwrap_or(usize::MAX).min(self.attractions.len());

        let mut ranked = self.distances_from(point).collect::<Vec<_>>();
        // Stable sort so equal distances stay in catalog order
        ranked.sort_by(|a, b| a.distance_miles.total_cmp(&b.distance_miles));
        ranked.truncate(n);

        Ok(ranked)
    }

    /// Every attraction within `radius_miles` of `point`, boundary included.
    pub fn attractions_within_range(
        &self,
        point: Coordinate,
        radius_miles: f64,
    ) -> Vec<AttractionDistance> {
        self.distances_from(point)
            .filter(|candidate| candidate.distance_miles <= radius_miles)
            .collect()
    }

    fn distances_from(&self, point: Coordinate) -> impl Iterator<Item = AttractionDistance> + '_ {
        self.attractions.iter().map(move |attraction| AttractionDistance {
            distance_miles: distance_miles(point, attraction.location),
            attraction: attraction.clone(),
        })
    }
}
