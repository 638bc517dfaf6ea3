//! Tour guide service
//!
//! Ties the user repository, the location source and the reward engine
//! together behind the operations the HTTP layer exposes.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::geo::{Attraction, AttractionDistance, Coordinate};
use crate::gps::LocationSource;
use crate::rewards::{BatchReport, RewardCoordinator, RewardEngine, RewardScan};
use crate::users::{NewUser, User, UserRepository, UserReward, VisitedLocation};

/// Service-level knobs taken from `RewardsConfig`
#[derive(Debug, Clone)]
pub struct TourGuideSettings {
    pub attraction_proximity_range_miles: f64,
    pub nearby_attractions_count: usize,
    pub batch_timeout: Duration,
}

impl Default for TourGuideSettings {
    fn default() -> Self {
        Self {
            attraction_proximity_range_miles: 200.0,
            nearby_attractions_count: 5,
            batch_timeout: Duration::from_secs(240),
        }
    }
}

/// One entry of the "attractions near me" answer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyAttraction {
    pub attraction_name: String,
    pub attraction_location: Coordinate,
    pub user_location: Coordinate,
    pub distance_miles: f64,
    /// `None` when the oracle could not price it
    pub reward_points: Option<i32>,
}

pub struct TourGuideService {
    users: Arc<UserRepository>,
    coordinator: RewardCoordinator,
    location_source: Arc<dyn LocationSource>,
    settings: TourGuideSettings,
}

impl TourGuideService {
    pub fn new(
        users: Arc<UserRepository>,
        coordinator: RewardCoordinator,
        location_source: Arc<dyn LocationSource>,
        settings: TourGuideSettings,
    ) -> Self {
        Self {
            users,
            coordinator,
            location_source,
            settings,
        }
    }

    pub fn users(&self) -> &Arc<UserRepository> {
        &self.users
    }

    pub fn engine(&self) -> &RewardEngine {
        self.coordinator.engine()
    }

    pub fn settings(&self) -> &TourGuideSettings {
        &self.settings
    }

    pub fn get_user(&self, user_name: &str) -> Result<Arc<User>> {
        self.users.get_user(user_name)
    }

    pub fn add_user(&self, new_user: NewUser) -> Result<Arc<User>> {
        self.users.add_user(new_user)
    }

    /// Last known location, tracking a fresh one when the user has none
    pub async fn get_user_location(&self, user_name: &str) -> Result<VisitedLocation> {
        let user = self.get_user(user_name)?;
        match user.last_visited_location() {
            Some(visit) => Ok(visit),
            None => self.track_user_location(&user).await,
        }
    }

    /// Polls the location source, records the visit, then runs a reward pass.
    ///
    /// A failed or refused reward pass is logged; the visit is kept either way.
    #[instrument(skip_all, fields(user = %user.user_name))]
    pub async fn track_user_location(&self, user: &Arc<User>) -> Result<VisitedLocation> {
        let visit = self.location_source.current_location(user.user_id).await?;
        user.add_visited_location(visit.clone());
        debug!(
            "📍 {} at ({:.4}, {:.4})",
            user.user_name, visit.location.latitude, visit.location.longitude
        );

        match self.engine().calculate_rewards(user).await {
            Ok(scan) => log_scan(&scan),
            Err(e) => warn!("Skipped reward pass for {}: {}", user.user_name, e),
        }

        Ok(visit)
    }

    /// Tracks every registered user once, returning how many were updated
    pub async fn track_all_users(&self) -> usize {
        self.track_all_users_until(&CancellationToken::new()).await
    }

    /// Sweep that stops before the next user once `cancel` fires
    pub async fn track_all_users_until(&self, cancel: &CancellationToken) -> usize {
        let users = self.users.all_users();
        let mut tracked = 0;
        for user in &users {
            if cancel.is_cancelled() {
                info!("📍 Tracking sweep cancelled after {}/{} users", tracked, users.len());
                return tracked;
            }
            match self.track_user_location(user).await {
                Ok(_) => tracked += 1,
                Err(e) => warn!("Failed to track {}: {}", user.user_name, e),
            }
        }
        info!("📍 Tracked {}/{} users", tracked, users.len());
        tracked
    }

    /// Closest attractions to the user's location, each with a reward quote
    pub async fn get_nearby_attractions(&self, user_name: &str) -> Result<Vec<NearbyAttraction>> {
        let user = self.get_user(user_name)?;
        let visit = self.get_user_location(user_name).await?;
        let nearest = self.engine().attractions().nearest_attractions(
            visit.location,
            self.settings.nearby_attractions_count as i64,
        )?;

        let mut nearby = Vec::with_capacity(nearest.len());
        for AttractionDistance {
            attraction,
            distance_miles,
        } in nearest
        {
            let reward_points = match self.engine().reward_points(&attraction, &user).await {
                Ok(points) => Some(points),
                Err(e) => {
                    warn!("No reward quote for {}: {}", attraction.attraction_name, e);
                    None
                }
            };
            nearby.push(NearbyAttraction {
                attraction_name: attraction.attraction_name,
                attraction_location: attraction.location,
                user_location: visit.location,
                distance_miles,
                reward_points,
            });
        }

        Ok(nearby)
    }

    /// Attractions within the configured attraction range of the user
    pub async fn attractions_in_range(&self, user_name: &str) -> Result<Vec<AttractionDistance>> {
        let visit = self.get_user_location(user_name).await?;
        Ok(self
            .engine()
            .attractions()
            .attractions_within_range(visit.location, self.settings.attraction_proximity_range_miles))
    }

    pub fn all_attractions(&self) -> Vec<Attraction> {
        self.engine().attractions().all().to_vec()
    }

    pub fn get_user_rewards(&self, user_name: &str) -> Result<Vec<UserReward>> {
        self.users.get_user_rewards(user_name)
    }

    pub fn all_current_locations(&self) -> HashMap<Uuid, Coordinate> {
        self.users.all_current_locations()
    }

    /// One reward pass for a single user
    pub async fn calculate_rewards(&self, user_name: &str) -> Result<RewardScan> {
        let user = self.get_user(user_name)?;
        let scan = self.engine().calculate_rewards(&user).await?;
        log_scan(&scan);
        Ok(scan)
    }

    /// Reward pass over every registered user, bounded by the batch timeout
    pub async fn calculate_all_rewards(&self) -> BatchReport {
        self.calculate_all_rewards_until(&CancellationToken::new())
            .await
    }

    /// Like [`calculate_all_rewards`](Self::calculate_all_rewards), also stopping when `cancel` fires
    pub async fn calculate_all_rewards_until(&self, cancel: &CancellationToken) -> BatchReport {
        self.calculate_all_rewards_within(self.settings.batch_timeout, cancel)
            .await
    }

    /// Reward pass over every user bounded by `deadline` instead of the
    /// configured batch timeout
    pub async fn calculate_all_rewards_within(
        &self,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> BatchReport {
        self.coordinator
            .calculate_all_rewards_within(self.users.all_users(), deadline, cancel)
            .await
    }

    pub fn proximity_buffer(&self) -> f64 {
        self.engine().proximity().proximity_buffer()
    }

    pub fn set_proximity_buffer(&self, miles: f64) -> Result<()> {
        self.engine().set_proximity_buffer(miles)
    }

    pub fn set_default_proximity_buffer(&self) {
        self.engine().set_default_proximity_buffer()
    }
}

impl std::fmt::Debug for TourGuideService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TourGuideService")
            .field("users", &self.users.len())
            .field("coordinator", &self.coordinator)
            .field("settings", &self.settings)
            .finish()
    }
}

fn log_scan(scan: &RewardScan) {
    if !scan.new_rewards.is_empty() {
        info!("🎁 {} new rewards for {}", scan.new_rewards.len(), scan.user_name);
    }
    for failure in &scan.failures {
        warn!(
            "Reward for {} at {} deferred: {}",
            scan.user_name, failure.attraction.attraction_name, failure.error
        );
    }
}
