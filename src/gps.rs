//! Location supplier
//!
//! Where a user currently is. Production deployments plug in a real GPS
//! feed; the simulated source is used for local runs and tests.

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::users::internal::random_coordinate;
use crate::users::VisitedLocation;

#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn current_location(&self, user_id: Uuid) -> anyhow::Result<VisitedLocation>;
}

/// Reports a random point on the globe, timestamped now
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedGps;

#[async_trait]
impl LocationSource for SimulatedGps {
    async fn current_location(&self, user_id: Uuid) -> anyhow::Result<VisitedLocation> {
        let location = random_coordinate(&mut rand::thread_rng());
        Ok(VisitedLocation::new(user_id, location, Utc::now()))
    }
}
