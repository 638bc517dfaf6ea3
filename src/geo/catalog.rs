//! Attraction catalog suppliers
//!
//! The catalog is static for the process lifetime. It comes either from the
//! built-in list of attractions or from a JSON/TOML file.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

use super::attractions::Attraction;
use crate::error::{Error, Result};

/// Source of the static attraction list
pub trait AttractionCatalog: Send + Sync {
    fn attractions(&self) -> Result<Vec<Attraction>>;
}

static BUILTIN_ATTRACTIONS: Lazy<Vec<Attraction>> = Lazy::new(|| {
    vec![
        Attraction::new("Disneyland", "Anaheim", "CA", 33.817595, -117.922008).with_base_points(450),
        Attraction::new("Jackson Hole", "Jackson Hole", "WY", 43.582767, -110.821999).with_base_points(380),
        Attraction::new("Mojave National Preserve", "Kelso", "CA", 35.141689, -115.510399).with_base_points(250),
        Attraction::new("Joshua Tree National Park", "Joshua Tree National Park", "CA", 33.881866, -115.90065).with_base_points(300),
        Attraction::new("Buffalo National River", "St Joe", "AR", 35.985512, -92.757652).with_base_points(180),
        Attraction::new("Hot Springs National Park", "Hot Springs", "AR", 34.52153, -93.042267).with_base_points(220),
        Attraction::new("Kartchner Caverns State Park", "Benson", "AZ", 31.837551, -110.347382).with_base_points(160),
        Attraction::new("Legend Valley", "Thornville", "OH", 39.937778, -82.40667).with_base_points(120),
        Attraction::new("Flowers Bakery of London", "Flowers Bakery of London", "KY", 37.131527, -84.07486).with_base_points(40),
        Attraction::new("McKinley Tower", "Anchorage", "AK", 61.218887, -149.877502).with_base_points(140),
        Attraction::new("Flatiron Building", "New York City", "NY", 40.741112, -73.989723).with_base_points(310),
        Attraction::new("Fallingwater", "Mill Run", "PA", 39.906113, -79.468056).with_base_points(260),
        Attraction::new("Union Station", "Washington D.C.", "DC", 38.897095, -77.006332).with_base_points(200),
        Attraction::new("Roger Dean Stadium", "Jupiter", "FL", 26.890959, -80.116577).with_base_points(110),
        Attraction::new("Texas Memorial Stadium", "Austin", "TX", 30.283682, -97.732536).with_base_points(190),
        Attraction::new("Bryant-Denny Stadium", "Tuscaloosa", "AL", 33.208973, -87.550438).with_base_points(170),
        Attraction::new("Tiger Stadium", "Baton Rouge", "LA", 30.412035, -91.183815).with_base_points(170),
        Attraction::new("Neyland Stadium", "Knoxville", "TN", 35.955013, -83.925011).with_base_points(160),
        Attraction::new("Kyle Field", "College Station", "TX", 30.61025, -96.339844).with_base_points(150),
        Attraction::new("San Diego Zoo", "San Diego", "CA", 32.735317, -117.149048).with_base_points(350),
        Attraction::new("Zoo Tampa at Lowry Park", "Tampa", "FL", 28.012804, -82.469269).with_base_points(210),
        Attraction::new("Franklin Park Zoo", "Boston", "MA", 42.302601, -71.086731).with_base_points(190),
        Attraction::new("El Paso Zoo", "El Paso", "TX", 31.769125, -106.44487).with_base_points(130),
        Attraction::new("Rio Grande Zoo", "Albuquerque", "NM", 35.079037, -106.669266).with_base_points(130),
        Attraction::new("Cincinnati Zoo", "Cincinnati", "OH", 39.145191, -84.509286).with_base_points(200),
        Attraction::new("Hershey's Chocolate World", "Hershey", "PA", 40.28741, -76.653458).with_base_points(240),
    ]
});

/// The fixed attraction list shipped with the engine
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCatalog;

impl AttractionCatalog for BuiltinCatalog {
    fn attractions(&self) -> Result<Vec<Attraction>> {
        Ok(BUILTIN_ATTRACTIONS.clone())
    }
}

/// One catalog entry as written in a file; the id is derived from name, place and
/// coordinates when absent. Keys are camelCase, snake_case is accepted too.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntry {
    #[serde(default, alias = "attraction_id")]
    attraction_id: Option<Uuid>,
    #[serde(alias = "attraction_name")]
    attraction_name: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    state: String,
    latitude: f64,
    longitude: f64,
    #[serde(default, alias = "base_reward_points")]
    base_reward_points: i32,
}

impl From<CatalogEntry> for Attraction {
    fn from(entry: CatalogEntry) -> Self {
        let mut attraction = Attraction::new(
            entry.attraction_name,
            entry.city,
            entry.state,
            entry.latitude,
            entry.longitude,
        )
        .with_base_points(entry.base_reward_points);
        if let Some(id) = entry.attraction_id {
            attraction.attraction_id = id;
        }
        attraction
    }
}

#[derive(Debug, Deserialize)]
struct TomlCatalog {
    attractions: Vec<CatalogEntry>,
}

/// Attraction list loaded from a `.json` array or a `.toml` file with `[[attractions]]` tables
#[derive(Debug, Clone)]
pub struct FileCatalog {
    path: PathBuf,
}

impl FileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn parse(&self, contents: &str) -> Result<Vec<CatalogEntry>> {
        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("json") => Ok(serde_json::from_str(contents)?),
            Some("toml") => toml::from_str::<TomlCatalog>(contents)
                .map(|catalog| catalog.attractions)
                .map_err(|e| {
                    Error::config(format!("Invalid attraction catalog {}", self.path.display()), e)
                }),
            _ => Err(Error::InvalidConfig {
                key: "ATTRACTIONS_FILE",
                message: format!(
                    "Unsupported catalog format for {} (expected .json or .toml)",
                    self.path.display()
                )
                .into(),
            }),
        }
    }
}

impl AttractionCatalog for FileCatalog {
    fn attractions(&self) -> Result<Vec<Attraction>> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::config(format!("Failed to read attraction catalog {}", self.path.display()), e)
        })?;

        let attractions: Vec<Attraction> = self
            .parse(&contents)?
            .into_iter()
            .map(Attraction::from)
            .collect();

        info!(
            "Loaded {} attractions from {}",
            attractions.len(),
            self.path.display()
        );
        Ok(attractions)
    }
}
