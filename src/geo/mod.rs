//! Geography Module
//!
//! Coordinates, great-circle distance, and the static attraction catalog.
//!
//! ## Components
//!
//! 1. **Distance** - Haversine distance in statute miles
//! 2. **Attractions** - Read-only index answering nearest-N and within-range queries
//! 3. **Catalog** - Suppliers of the attraction list (built-in or file backed)

pub mod attractions;
pub mod catalog;
pub mod distance;

pub use attractions::{Attraction, AttractionDistance, AttractionIndex};
pub use catalog::{AttractionCatalog, BuiltinCatalog, FileCatalog};
pub use distance::{distance_miles, Coordinate};
