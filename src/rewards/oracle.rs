//! Reward points oracle
//!
//! The oracle is the external authority on how many points an attraction is
//! worth to a user. The engine only ever talks to it through [`OracleAdapter`],
//! which bounds each call and folds every failure into `OracleUnavailable`.
//! The adapter never retries; retrying is the next scheduled pass's job.

use anyhow::Context;
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::error::{BoxError, Error, Result};
use crate::geo::Attraction;

/// External points lookup
#[async_trait]
pub trait RewardPointsOracle: Send + Sync {
    async fn reward_points(&self, attraction: &Attraction, user_id: Uuid) -> anyhow::Result<i32>;
}

/// Stand-in for the RewardsCentral service: random points after a random delay
#[derive(Debug, Clone)]
pub struct SimulatedRewardsCentral {
    min_latency: Duration,
    max_latency: Duration,
}

impl SimulatedRewardsCentral {
    pub fn new(min_latency: Duration, max_latency: Duration) -> Self {
        Self {
            min_latency,
            max_latency: max_latency.max(min_latency),
        }
    }
}

impl Default for SimulatedRewardsCentral {
    fn default() -> Self {
        Self::new(Duration::from_millis(1), Duration::from_millis(1000))
    }
}

#[async_trait]
impl RewardPointsOracle for SimulatedRewardsCentral {
    async fn reward_points(&self, _attraction: &Attraction, _user_id: Uuid) -> anyhow::Result<i32> {
        let (delay, points) = {
            let mut rng = rand::thread_rng();
            let delay_ms = rng.gen_range(
                self.min_latency.as_millis() as u64..=self.max_latency.as_millis() as u64,
            );
            (Duration::from_millis(delay_ms), rng.gen_range(1..1000))
        };
        tokio::time::sleep(delay).await;
        Ok(points)
    }
}

/// Answers with the catalog's base points hint, no I/O
#[derive(Debug, Clone, Copy, Default)]
pub struct BasePointsOracle;

#[async_trait]
impl RewardPointsOracle for BasePointsOracle {
    async fn reward_points(&self, attraction: &Attraction, _user_id: Uuid) -> anyhow::Result<i32> {
        Ok(attraction.base_reward_points)
    }
}

#[derive(Debug, Deserialize)]
struct PointsResponse {
    points: i32,
}

/// Remote oracle reached over HTTP
///
/// `GET {base_url}/attractions/{attraction_id}/points?user_id={user_id}` answering `{"points": n}`.
#[derive(Debug, Clone)]
pub struct HttpRewardsOracle {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRewardsOracle {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::config("Failed to build rewards oracle HTTP client", e))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RewardPointsOracle for HttpRewardsOracle {
    async fn reward_points(&self, attraction: &Attraction, user_id: Uuid) -> anyhow::Result<i32> {
        let url = format!(
            "{}/attractions/{}/points",
            self.base_url, attraction.attraction_id
        );

        let response = self
            .client
            .get(&url)
            .query(&[("user_id", user_id.to_string())])
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()?;

        let body: PointsResponse = response
            .json()
            .await
            .context("rewards oracle returned an unreadable body")?;

        Ok(body.points)
    }
}

/// Pass-through wrapper isolating oracle failures and latency
#[derive(Clone)]
pub struct OracleAdapter {
    oracle: Arc<dyn RewardPointsOracle>,
    call_timeout: Duration,
}

impl OracleAdapter {
    pub fn new(oracle: Arc<dyn RewardPointsOracle>, call_timeout: Duration) -> Self {
        Self {
            oracle,
            call_timeout,
        }
    }

    /// Upper bound on a single oracle call
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Points for `attraction` as seen by `user_id`, always `>= 0` on success
    pub async fn points(&self, attraction: &Attraction, user_id: Uuid) -> Result<i32> {
        let unavailable = |cause: BoxError| {
            Error::oracle_unavailable(attraction.attraction_name.as_str(), user_id, cause)
        };

        let points = match tokio::time::timeout(
            self.call_timeout,
            self.oracle.reward_points(attraction, user_id),
        )
        .await
        {
            Ok(Ok(points)) => points,
            Ok(Err(e)) => return Err(unavailable(e.into())),
            Err(_) => {
                return Err(unavailable(
                    Error::Timeout {
                        timeout_ms: self.call_timeout.as_millis() as u64,
                    }
                    .into(),
                ))
            }
        };

        if points < 0 {
            return Err(unavailable(
                format!("oracle returned negative points ({})", points).into(),
            ));
        }

        debug!(
            "Oracle granted {} points for {} to user {}",
            points, attraction.attraction_name, user_id
        );
        Ok(points)
    }
}

impl std::fmt::Debug for OracleAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleAdapter")
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}
