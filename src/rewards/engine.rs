//! Reward Engine
//!
//! Core algorithm turning a user's visited locations into reward records.
//!
//! One pass over a user:
//! 1. Snapshot the location ledger and the set of already rewarded attractions
//! 2. Walk visits in ledger order, and for each visit every attraction not yet rewarded
//! 3. The first visit within the proximity buffer of an attraction asks the oracle for
//!    points and records the reward; later visits no longer consider that attraction
//!
//! Re-running a pass on unchanged data adds nothing. A failed oracle call skips
//! only that attraction for this pass.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::metrics::{record_oracle_failure, record_rewards_created, PerformanceTimer};
use super::oracle::OracleAdapter;
use super::proximity::ProximitySettings;
use crate::error::{Error, Result};
use crate::geo::{Attraction, AttractionIndex};
use crate::users::{RewardClaim, User, UserReward, VisitedLocation};

const SLOW_SCAN_MS: u64 = 10_000;

/// An attraction the oracle could not price during a pass
#[derive(Debug)]
pub struct PairFailure {
    pub attraction: Attraction,
    pub error: Error,
}

/// Outcome of one pass over one user
#[derive(Debug)]
pub struct RewardScan {
    pub user_id: Uuid,
    pub user_name: String,
    pub visits_scanned: usize,
    pub new_rewards: Vec<UserReward>,
    pub failures: Vec<PairFailure>,
    /// Stopped early because the caller cancelled
    pub cancelled: bool,
}

impl RewardScan {
    fn new(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            user_name: user.user_name.clone(),
            visits_scanned: 0,
            new_rewards: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Compact per-pass summary for logs and API responses
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub user_name: String,
    pub new_rewards: usize,
    pub failed_attractions: Vec<String>,
    pub cancelled: bool,
}

impl From<&RewardScan> for ScanSummary {
    fn from(scan: &RewardScan) -> Self {
        Self {
            user_name: scan.user_name.clone(),
            new_rewards: scan.new_rewards.len(),
            failed_attractions: scan
                .failures
                .iter()
                .map(|f| f.attraction.attraction_name.clone())
                .collect(),
            cancelled: scan.cancelled,
        }
    }
}

/// Main reward engine
#[derive(Clone, Debug)]
pub struct RewardEngine {
    attractions: Arc<AttractionIndex>,
    oracle: OracleAdapter,
    proximity: Arc<ProximitySettings>,
}

impl RewardEngine {
    pub fn new(
        attractions: Arc<AttractionIndex>,
        oracle: OracleAdapter,
        proximity: Arc<ProximitySettings>,
    ) -> Self {
        Self {
            attractions,
            oracle,
            proximity,
        }
    }

    pub fn attractions(&self) -> &Arc<AttractionIndex> {
        &self.attractions
    }

    pub fn oracle(&self) -> &OracleAdapter {
        &self.oracle
    }

    pub fn proximity(&self) -> &ProximitySettings {
        &self.proximity
    }

    pub fn set_proximity_buffer(&self, miles: f64) -> Result<()> {
        self.proximity.set_proximity_buffer(miles)
    }

    pub fn set_default_proximity_buffer(&self) {
        self.proximity.set_default_proximity_buffer()
    }

    /// Whether `visit` is close enough to `attraction` to earn its reward
    pub fn is_within_reward_proximity(&self, visit: &VisitedLocation, attraction: &Attraction) -> bool {
        qualifies(visit, attraction, self.proximity.proximity_buffer())
    }

    /// Points the oracle assigns to `attraction` for `user`
    pub async fn reward_points(&self, attraction: &Attraction, user: &User) -> Result<i32> {
        self.oracle.points(attraction, user.user_id).await
    }

    /// Runs one pass for `user`.
    ///
    /// Fails with `RewardsInProgress` if another pass holds the user.
    pub async fn calculate_rewards(&self, user: &Arc<User>) -> Result<RewardScan> {
        self.calculate_rewards_until(user, &CancellationToken::new())
            .await
    }

    /// Like [`calculate_rewards`](Self::calculate_rewards), but stops issuing
    /// oracle calls once `cancel` fires. Calls already in flight complete.
    pub async fn calculate_rewards_until(
        &self,
        user: &Arc<User>,
        cancel: &CancellationToken,
    ) -> Result<RewardScan> {
        let claim = user
            .try_claim_rewards()
            .ok_or_else(|| Error::RewardsInProgress {
                user_name: user.user_name.clone(),
            })?;

        Ok(self.scan(&claim, cancel).await)
    }

    #[instrument(skip_all, fields(user = %claim.user().user_name))]
    async fn scan(&self, claim: &RewardClaim, cancel: &CancellationToken) -> RewardScan {
        let timer = PerformanceTimer::new("calculate_rewards");
        let user = claim.user();
        let mut scan = RewardScan::new(user);

        // The threshold is read once so a concurrent update cannot split a pass
        let buffer = self.proximity.proximity_buffer();
        let visits = user.visited_locations().all();
        let mut rewarded: HashSet<Uuid> = user.rewards().rewarded_attraction_ids();
        let mut skipped: HashSet<Uuid> = HashSet::new();
        scan.visits_scanned = visits.len();

        'visits: for visit in &visits {
            for attraction in self.attractions.all() {
                let id = attraction.attraction_id;
                if rewarded.contains(&id) || skipped.contains(&id) {
                    continue;
                }
                if !qualifies(visit, attraction, buffer) {
                    continue;
                }
                if cancel.is_cancelled() {
                    scan.cancelled = true;
                    break 'visits;
                }

                match self.oracle.points(attraction, user.user_id).await {
                    Ok(points) => {
                        let reward = UserReward {
                            visited_location: visit.clone(),
                            attraction: attraction.clone(),
                            reward_points: points,
                        };
                        if claim.record(reward.clone()) {
                            scan.new_rewards.push(reward);
                        }
                        rewarded.insert(id);
                    }
                    Err(error) => {
                        warn!(
                            "Skipping {} for {} this pass: {}",
                            attraction.attraction_name, user.user_name, error
                        );
                        record_oracle_failure();
                        skipped.insert(id);
                        scan.failures.push(PairFailure {
                            attraction: attraction.clone(),
                            error,
                        });
                    }
                }
            }
        }

        record_rewards_created(scan.new_rewards.len());
        debug!(
            "Scanned {} visits for {}: {} new rewards, {} oracle failures",
            scan.visits_scanned,
            user.user_name,
            scan.new_rewards.len(),
            scan.failures.len()
        );
        timer.log_if_slow(SLOW_SCAN_MS);

        scan
    }
}

fn qualifies(visit: &VisitedLocation, attraction: &Attraction, buffer_miles: f64) -> bool {
    visit.location.distance_to(&attraction.location) <= buffer_miles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{distance_miles, Coordinate};
    use crate::rewards::oracle::{BasePointsOracle, RewardPointsOracle};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Miles per degree of latitude on the engine's sphere
    fn miles_per_degree() -> f64 {
        distance_miles(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0))
    }

    fn north_of_origin(miles: f64) -> Coordinate {
        Coordinate::new(miles / miles_per_degree(), 0.0)
    }

    fn landmark() -> Attraction {
        Attraction::new("Landmark", "Origin", "XX", 0.0, 0.0).with_base_points(100)
    }

    fn engine_with(
        attractions: Vec<Attraction>,
        oracle: impl RewardPointsOracle + 'static,
        buffer: f64,
    ) -> RewardEngine {
        RewardEngine::new(
            Arc::new(AttractionIndex::new(attractions).unwrap()),
            OracleAdapter::new(Arc::new(oracle), Duration::from_secs(1)),
            Arc::new(ProximitySettings::new(buffer).unwrap()),
        )
    }

    fn user_at(points: &[Coordinate]) -> Arc<User> {
        let user = Arc::new(User::new(Uuid::new_v4(), "jon", "000", "jon@tourGuide.com"));
        for point in points {
            user.add_visited_location(VisitedLocation::new(user.user_id, *point, Utc::now()));
        }
        user
    }

    struct CountingOracle(AtomicUsize);

    #[async_trait]
    impl RewardPointsOracle for CountingOracle {
        async fn reward_points(&self, _: &Attraction, _: Uuid) -> anyhow::Result<i32> {
            Ok(self.0.fetch_add(1, Ordering::SeqCst) as i32 + 1)
        }
    }

    struct FailingFor(Uuid);

    #[async_trait]
    impl RewardPointsOracle for FailingFor {
        async fn reward_points(&self, attraction: &Attraction, _: Uuid) -> anyhow::Result<i32> {
            if attraction.attraction_id == self.0 {
                anyhow::bail!("rewards central is down");
            }
            Ok(7)
        }
    }

    #[tokio::test]
    async fn test_first_qualifying_visit_wins() {
        let engine = engine_with(vec![landmark()], BasePointsOracle, 5.0);
        let user = user_at(&[north_of_origin(10.0), north_of_origin(2.0), north_of_origin(50.0)]);
        let second_visit = user.visited_locations().all()[1].clone();

        let scan = engine.calculate_rewards(&user).await.unwrap();

        assert_eq!(scan.new_rewards.len(), 1);
        let rewards = user.user_rewards();
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].visited_location, second_visit);
        assert_eq!(rewards[0].reward_points, 100);
    }

    #[tokio::test]
    async fn test_boundary_distance_qualifies() {
        let visit = north_of_origin(3.0);
        let exact = distance_miles(visit, landmark().location);
        let engine = engine_with(vec![landmark()], BasePointsOracle, exact);
        let user = user_at(&[visit]);

        engine.calculate_rewards(&user).await.unwrap();
        assert_eq!(user.user_rewards().len(), 1);
    }

    #[tokio::test]
    async fn test_second_pass_adds_nothing() {
        let oracle = CountingOracle(AtomicUsize::new(0));
        let engine = engine_with(vec![landmark()], oracle, 5.0);
        let user = user_at(&[north_of_origin(1.0), north_of_origin(2.0)]);

        let first = engine.calculate_rewards(&user).await.unwrap();
        let second = engine.calculate_rewards(&user).await.unwrap();

        assert_eq!(first.new_rewards.len(), 1);
        assert!(second.new_rewards.is_empty());
        assert_eq!(user.user_rewards().len(), 1);
    }

    #[tokio::test]
    async fn test_each_attraction_rewarded_once() {
        let a = Attraction::new("A", "Origin", "XX", 0.0, 0.0);
        let b = Attraction::new("B", "Origin", "XX", 0.01, 0.0);
        let engine = engine_with(vec![a, b], BasePointsOracle, 50.0);
        let user = user_at(&[north_of_origin(1.0), north_of_origin(2.0), north_of_origin(3.0)]);

        engine.calculate_rewards(&user).await.unwrap();

        let ids: HashSet<_> = user
            .user_rewards()
            .iter()
            .map(|r| r.attraction.attraction_id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(user.user_rewards().len(), 2);
    }

    #[tokio::test]
    async fn test_oracle_failure_skips_only_that_attraction() {
        let broken = Attraction::new("Broken", "Origin", "XX", 0.0, 0.0);
        let fine = Attraction::new("Fine", "Origin", "XX", 0.0, 0.001);
        let engine = engine_with(
            vec![broken.clone(), fine.clone()],
            FailingFor(broken.attraction_id),
            5.0,
        );
        let user = user_at(&[north_of_origin(1.0), north_of_origin(1.5)]);

        let scan = engine.calculate_rewards(&user).await.unwrap();

        assert_eq!(scan.failures.len(), 1, "one failure per pair per pass");
        assert_eq!(scan.failures[0].attraction.attraction_id, broken.attraction_id);
        assert!(matches!(scan.failures[0].error, Error::OracleUnavailable { .. }));
        let rewards = user.user_rewards();
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].attraction.attraction_id, fine.attraction_id);
    }

    #[tokio::test]
    async fn test_failed_pair_is_retried_next_pass() {
        let engine = engine_with(vec![landmark()], FailingFor(landmark().attraction_id), 5.0);
        let user = user_at(&[north_of_origin(1.0)]);
        assert!(!engine.calculate_rewards(&user).await.unwrap().is_clean());

        let healthy = RewardEngine::new(
            Arc::clone(engine.attractions()),
            OracleAdapter::new(Arc::new(BasePointsOracle), Duration::from_secs(1)),
            Arc::new(ProximitySettings::new(5.0).unwrap()),
        );
        let scan = healthy.calculate_rewards(&user).await.unwrap();
        assert!(scan.is_clean());
        assert_eq!(user.user_rewards().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_buffer_then_default() {
        let near = Attraction::new("Near", "Origin", "XX", 0.0, 0.0);
        let other = Attraction::new("Other", "Elsewhere", "XX", 10.0, 0.0);
        let engine = engine_with(vec![near, other.clone()], BasePointsOracle, 5.0);
        let user = user_at(&[north_of_origin(1.0)]);
        engine.calculate_rewards(&user).await.unwrap();
        assert_eq!(user.user_rewards().len(), 1);

        engine.set_proximity_buffer(0.0).unwrap();
        let close_to_other = Coordinate::new(10.0 + 1.0 / miles_per_degree(), 0.0);
        user.add_visited_location(VisitedLocation::new(user.user_id, close_to_other, Utc::now()));
        engine.calculate_rewards(&user).await.unwrap();
        assert_eq!(user.user_rewards().len(), 1);

        engine.set_default_proximity_buffer();
        assert_eq!(engine.proximity().proximity_buffer(), 5.0);
        engine.calculate_rewards(&user).await.unwrap();
        assert_eq!(user.user_rewards().len(), 2);
    }

    #[tokio::test]
    async fn test_claimed_user_is_refused() {
        let engine = engine_with(vec![landmark()], BasePointsOracle, 5.0);
        let user = user_at(&[north_of_origin(1.0)]);

        let _claim = user.try_claim_rewards().unwrap();
        let err = engine.calculate_rewards(&user).await.unwrap_err();
        assert!(matches!(err, Error::RewardsInProgress { .. }));
        assert!(user.user_rewards().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_pass_issues_no_oracle_calls() {
        let oracle = Arc::new(CountingOracle(AtomicUsize::new(0)));
        let engine = RewardEngine::new(
            Arc::new(AttractionIndex::new(vec![landmark()]).unwrap()),
            OracleAdapter::new(oracle.clone(), Duration::from_secs(1)),
            Arc::new(ProximitySettings::new(5.0).unwrap()),
        );
        let user = user_at(&[north_of_origin(1.0)]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let scan = engine.calculate_rewards_until(&user, &cancel).await.unwrap();

        assert!(scan.cancelled);
        assert_eq!(oracle.0.load(Ordering::SeqCst), 0);
        assert!(user.user_rewards().is_empty());
    }

    #[tokio::test]
    async fn test_empty_ledger_is_a_no_op() {
        let engine = engine_with(vec![landmark()], BasePointsOracle, 5.0);
        let user = user_at(&[]);
        let scan = engine.calculate_rewards(&user).await.unwrap();
        assert_eq!(scan.visits_scanned, 0);
        assert!(scan.is_clean());
    }
}
