//! Per-user reward records
//!
//! Grows monotonically and holds at most one reward per attraction.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::ledger::VisitedLocation;
use crate::geo::Attraction;

/// Points earned for visiting an attraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserReward {
    pub visited_location: VisitedLocation,
    pub attraction: Attraction,
    pub reward_points: i32,
}

#[derive(Debug, Default)]
pub struct RewardSet {
    rewards: RwLock<Vec<UserReward>>,
}

impl RewardSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the rewards in the order they were granted
    pub fn snapshot(&self) -> Vec<UserReward> {
        self.rewards.read().clone()
    }

    pub fn rewarded_attraction_ids(&self) -> HashSet<Uuid> {
        self.rewards
            .read()
            .iter()
            .map(|r| r.attraction.attraction_id)
            .collect()
    }

    pub fn total_points(&self) -> i64 {
        self.rewards
            .read()
            .iter()
            .map(|r| i64::from(r.reward_points))
            .sum()
    }

    pub fn len(&self) -> usize {
        self.rewards.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.read().is_empty()
    }

    /// Adds `reward` unless its attraction is already rewarded. Returns whether it was added.
    pub(crate) fn insert(&self, reward: UserReward) -> bool {
        let mut rewards = self.rewards.write();
        let attraction_id = reward.attraction.attraction_id;
        if rewards
            .iter()
            .any(|r| r.attraction.attraction_id == attraction_id)
        {
            return false;
        }
        rewards.push(reward);
        true
    }
}
