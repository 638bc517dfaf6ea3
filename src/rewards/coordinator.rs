//! Reward pass over the whole user population.
//!
//! Each user is one unit of work, run end-to-end by the engine on a bounded
//! pool. A user appears at most once per batch and its reward claim keeps any
//! other pass off it. Failures are collected, never propagated.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::engine::{RewardEngine, RewardScan};
use super::metrics::{record_batch, PerformanceTimer};
use crate::error::Error;
use crate::users::User;

/// Something that went wrong for one user during a batch
#[derive(Debug)]
pub struct RewardFailure {
    /// `None` only when the worker task itself died
    pub user_id: Option<Uuid>,
    pub user_name: Option<String>,
    /// Set for oracle failures on a single attraction
    pub attraction: Option<String>,
    pub error: Error,
}

/// Outcome of a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub users_total: usize,
    pub users_completed: usize,
    pub users_skipped: usize,
    pub rewards_created: usize,
    pub failures: Vec<RewardFailure>,
    /// True when cancellation or the deadline cut the batch short
    pub incomplete: bool,
    pub elapsed_ms: u64,
}

impl BatchReport {
    /// Number of distinct users with at least one failure
    pub fn failed_users(&self) -> usize {
        let mut seen = HashSet::new();
        let mut unknown = 0;
        for failure in &self.failures {
            match failure.user_id {
                Some(id) => {
                    seen.insert(id);
                }
                None => unknown += 1,
            }
        }
        seen.len() + unknown
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.incomplete
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            users_total: self.users_total,
            users_completed: self.users_completed,
            users_skipped: self.users_skipped,
            rewards_created: self.rewards_created,
            failed_users: self.failed_users(),
            failures: self
                .failures
                .iter()
                .map(|f| FailureSummary {
                    user_name: f.user_name.clone(),
                    attraction: f.attraction.clone(),
                    code: f.error.error_code(),
                    message: f.error.to_string(),
                    retryable: f.error.is_retryable(),
                })
                .collect(),
            incomplete: self.incomplete,
            elapsed_ms: self.elapsed_ms,
        }
    }

    fn absorb(&mut self, scan: RewardScan) {
        self.rewards_created += scan.new_rewards.len();
        if scan.cancelled {
            self.incomplete = true;
        } else {
            self.users_completed += 1;
        }
        for failure in scan.failures {
            self.failures.push(RewardFailure {
                user_id: Some(scan.user_id),
                user_name: Some(scan.user_name.clone()),
                attraction: Some(failure.attraction.attraction_name),
                error: failure.error,
            });
        }
    }
}

/// Serializable view of a [`BatchReport`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub users_total: usize,
    pub users_completed: usize,
    pub users_skipped: usize,
    pub rewards_created: usize,
    pub failed_users: usize,
    pub failures: Vec<FailureSummary>,
    pub incomplete: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureSummary {
    pub user_name: Option<String>,
    pub attraction: Option<String>,
    pub code: &'static str,
    pub message: String,
    /// Whether a later pass may succeed
    pub retryable: bool,
}

/// Runs the reward engine across many users on a bounded worker pool
#[derive(Clone, Debug)]
pub struct RewardCoordinator {
    engine: RewardEngine,
    worker_count: usize,
}

impl RewardCoordinator {
    pub fn new(engine: RewardEngine, worker_count: usize) -> Self {
        Self {
            engine,
            worker_count: worker_count.max(1),
        }
    }

    pub fn engine(&self) -> &RewardEngine {
        &self.engine
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Processes every user and waits for all of them.
    pub async fn calculate_all_rewards(&self, users: Vec<Arc<User>>) -> BatchReport {
        self.calculate_all_rewards_until(users, CancellationToken::new())
            .await
    }

    /// Same as [`calculate_all_rewards`](Self::calculate_all_rewards) with a deadline;
    /// past it no new oracle calls are issued and the report is marked incomplete.
    pub async fn calculate_all_rewards_with_timeout(
        &self,
        users: Vec<Arc<User>>,
        timeout: Duration,
    ) -> BatchReport {
        self.calculate_all_rewards_within(users, timeout, &CancellationToken::new())
            .await
    }

    /// Deadline plus an outside cancel, whichever fires first.
    pub async fn calculate_all_rewards_within(
        &self,
        users: Vec<Arc<User>>,
        timeout: Duration,
        parent: &CancellationToken,
    ) -> BatchReport {
        let cancel = parent.child_token();
        let deadline = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                cancel.cancel();
            })
        };

        let report = self.calculate_all_rewards_until(users, cancel).await;
        deadline.abort();
        report
    }

    #[instrument(skip_all, fields(users = users.len(), workers = self.worker_count))]
    pub async fn calculate_all_rewards_until(
        &self,
        users: Vec<Arc<User>>,
        cancel: CancellationToken,
    ) -> BatchReport {
        let timer = PerformanceTimer::new("calculate_all_rewards");
        let mut report = BatchReport::default();

        let mut seen = HashSet::with_capacity(users.len());
        let users: Vec<Arc<User>> = users
            .into_iter()
            .filter(|user| seen.insert(user.user_id))
            .collect();
        report.users_total = users.len();

        info!(
            "🔄 Calculating rewards for {} users on {} workers...",
            users.len(),
            self.worker_count
        );

        let semaphore = Arc::new(Semaphore::new(self.worker_count));
        let mut set = JoinSet::new();
        let mut pending = users.into_iter();

        while let Some(user) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                report.users_skipped += 1 + pending.len();
                report.incomplete = true;
                break;
            };

            let engine = self.engine.clone();
            let cancel = cancel.clone();
            set.spawn(async move {
                let _permit = permit; // Hold permit until task completion
                let result = engine.calculate_rewards_until(&user, &cancel).await;
                (user, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(scan))) => report.absorb(scan),
                Ok((user, Err(error))) => {
                    warn!("Reward calculation failed for {}: {}", user.user_name, error);
                    report.failures.push(RewardFailure {
                        user_id: Some(user.user_id),
                        user_name: Some(user.user_name.clone()),
                        attraction: None,
                        error,
                    });
                }
                Err(join_error) => {
                    error!("Reward worker join error: {}", join_error);
                    report.failures.push(RewardFailure {
                        user_id: None,
                        user_name: None,
                        attraction: None,
                        error: Error::internal(join_error),
                    });
                }
            }
        }

        report.elapsed_ms = timer.elapsed_ms();
        record_batch(report.incomplete, report.failed_users());

        if report.incomplete {
            warn!(
                "⚠️ Reward batch incomplete: {}/{} users done, {} skipped, {} rewards",
                report.users_completed, report.users_total, report.users_skipped, report.rewards_created
            );
        } else {
            info!(
                "✅ Rewards calculated for {}/{} users ({} new rewards, {} users with failures)",
                report.users_completed,
                report.users_total,
                report.rewards_created,
                report.failed_users()
            );
        }
        debug!("Reward batch took {}ms", report.elapsed_ms);

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{Attraction, AttractionIndex, Coordinate};
    use crate::rewards::oracle::{BasePointsOracle, OracleAdapter, RewardPointsOracle};
    use crate::rewards::proximity::ProximitySettings;
    use crate::users::VisitedLocation;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn coordinator(oracle: Arc<dyn RewardPointsOracle>, workers: usize) -> RewardCoordinator {
        let engine = RewardEngine::new(
            Arc::new(AttractionIndex::new(vec![
                Attraction::new("Landmark", "Origin", "XX", 0.0, 0.0).with_base_points(10),
            ])
            .unwrap()),
            OracleAdapter::new(oracle, Duration::from_secs(5)),
            Arc::new(ProximitySettings::new(10.0).unwrap()),
        );
        RewardCoordinator::new(engine, workers)
    }

    fn visitor(name: &str) -> Arc<User> {
        let user = Arc::new(User::new(Uuid::new_v4(), name, "000", ""));
        user.add_visited_location(VisitedLocation::new(
            user.user_id,
            Coordinate::new(0.01, 0.0),
            Utc::now(),
        ));
        user
    }

    /// Tracks the most workers ever inside the oracle at once
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl RewardPointsOracle for Gauge {
        async fn reward_points(&self, _: &Attraction, _: Uuid) -> anyhow::Result<i32> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(1)
        }
    }

    #[tokio::test]
    async fn test_all_users_rewarded() {
        let users: Vec<_> = (0..20).map(|i| visitor(&format!("u{}", i))).collect();
        let report = coordinator(Arc::new(BasePointsOracle), 4)
            .calculate_all_rewards(users.clone())
            .await;

        assert!(report.is_clean());
        assert_eq!(report.users_completed, 20);
        assert_eq!(report.rewards_created, 20);
        assert!(users.iter().all(|u| u.user_rewards().len() == 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_is_bounded() {
        let gauge = Arc::new(Gauge {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let users: Vec<_> = (0..16).map(|i| visitor(&format!("u{}", i))).collect();

        let report = coordinator(gauge.clone(), 3)
            .calculate_all_rewards(users)
            .await;

        assert!(report.is_clean());
        assert!(gauge.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_duplicate_users_processed_once() {
        let user = visitor("twice");
        let report = coordinator(Arc::new(BasePointsOracle), 4)
            .calculate_all_rewards(vec![user.clone(), user.clone()])
            .await;

        assert_eq!(report.users_total, 1);
        assert!(report.is_clean());
        assert_eq!(user.user_rewards().len(), 1);
    }

    #[tokio::test]
    async fn test_busy_user_reported_not_fatal() {
        let busy = visitor("busy");
        let free = visitor("free");
        let _claim = busy.try_claim_rewards().unwrap();

        let report = coordinator(Arc::new(BasePointsOracle), 2)
            .calculate_all_rewards(vec![busy.clone(), free.clone()])
            .await;

        assert_eq!(report.failed_users(), 1);
        assert!(matches!(report.failures[0].error, Error::RewardsInProgress { .. }));
        assert_eq!(free.user_rewards().len(), 1);
        assert!(busy.user_rewards().is_empty());
    }

    struct Stalled;

    #[async_trait]
    impl RewardPointsOracle for Stalled {
        async fn reward_points(&self, _: &Attraction, _: Uuid) -> anyhow::Result<i32> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_new_work() {
        let users: Vec<_> = (0..4).map(|i| visitor(&format!("u{}", i))).collect();

        // One worker; the first user's oracle call outlives the deadline and times out
        let report = coordinator(Arc::new(Stalled), 1)
            .calculate_all_rewards_with_timeout(users, Duration::from_secs(1))
            .await;

        assert!(report.incomplete);
        assert_eq!(report.users_skipped, 3);
        assert_eq!(report.rewards_created, 0);
        assert_eq!(report.failed_users(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_batch_is_incomplete() {
        let users: Vec<_> = (0..5).map(|i| visitor(&format!("u{}", i))).collect();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = coordinator(Arc::new(BasePointsOracle), 2)
            .calculate_all_rewards_until(users.clone(), cancel)
            .await;

        assert!(report.incomplete);
        assert_eq!(report.users_skipped, 5);
        assert_eq!(report.rewards_created, 0);
        assert!(users.iter().all(|u| u.user_rewards().is_empty()));
    }
}
