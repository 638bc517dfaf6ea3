//! TourGuide library crate
//!
//! Proximity and reward computation for tracked users, plus the service and
//! HTTP layers the binary wires together. Re-exports core types for
//! integration tests and external use.

pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod gps;
pub mod rewards;
pub mod tour_guide;
pub mod users;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use geo::{Attraction, AttractionDistance, AttractionIndex, Coordinate};
pub use gps::{LocationSource, SimulatedGps};
pub use rewards::{
    BatchReport, OracleAdapter, ProximitySettings, RewardCoordinator, RewardEngine,
    RewardPointsOracle, RewardScan,
};
pub use tour_guide::{NearbyAttraction, TourGuideService, TourGuideSettings};
pub use users::{NewUser, User, UserRepository, UserReward, VisitedLocation};
