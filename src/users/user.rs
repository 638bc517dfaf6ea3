//! User identity plus the records it owns.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::ledger::{LocationLedger, VisitedLocation};
use super::reward_set::{RewardSet, UserReward};

/// Fields supplied when registering a user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub user_name: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub email_address: String,
}

/// Public view of a user, without its ledgers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: Uuid,
    pub user_name: String,
    pub phone_number: String,
    pub email_address: String,
    pub visited_location_count: usize,
    pub reward_count: usize,
    pub reward_points: i64,
}

#[derive(Debug)]
pub struct User {
    pub user_id: Uuid,
    pub user_name: String,
    pub phone_number: String,
    pub email_address: String,
    visited_locations: LocationLedger,
    rewards: RewardSet,
    reward_claimed: AtomicBool,
}

impl User {
    pub fn new(
        user_id: Uuid,
        user_name: impl Into<String>,
        phone_number: impl Into<String>,
        email_address: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            phone_number: phone_number.into(),
            email_address: email_address.into(),
            visited_locations: LocationLedger::new(),
            rewards: RewardSet::new(),
            reward_claimed: AtomicBool::new(false),
        }
    }

    pub fn visited_locations(&self) -> &LocationLedger {
        &self.visited_locations
    }

    pub fn add_visited_location(&self, location: VisitedLocation) {
        self.visited_locations.append(location);
    }

    pub fn last_visited_location(&self) -> Option<VisitedLocation> {
        self.visited_locations.last_location()
    }

    /// Read-only view of the reward set
    pub fn rewards(&self) -> &RewardSet {
        &self.rewards
    }

    pub fn user_rewards(&self) -> Vec<UserReward> {
        self.rewards.snapshot()
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            user_id: self.user_id,
            user_name: self.user_name.clone(),
            phone_number: self.phone_number.clone(),
            email_address: self.email_address.clone(),
            visited_location_count: self.visited_locations.len(),
            reward_count: self.rewards.len(),
            reward_points: self.rewards.total_points(),
        }
    }

    /// Takes the exclusive right to write this user's rewards.
    ///
    /// Returns `None` while another claim is alive.
    pub fn try_claim_rewards(self: &Arc<Self>) -> Option<RewardClaim> {
        self.reward_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RewardClaim {
                user: Arc::clone(self),
            })
    }

    pub fn is_reward_claimed(&self) -> bool {
        self.reward_claimed.load(Ordering::Acquire)
    }
}

/// Exclusive write access to one user's reward set, released on drop
#[derive(Debug)]
pub struct RewardClaim {
    user: Arc<User>,
}

impl RewardClaim {
    pub fn user(&self) -> &Arc<User> {
        &self.user
    }

    /// Records a reward; `false` when the attraction was already rewarded
    pub fn record(&self, reward: UserReward) -> bool {
        self.user.rewards.insert(reward)
    }
}

impl Drop for RewardClaim {
    fn drop(&mut self) {
        self.user.reward_claimed.store(false, Ordering::Release);
    }
}
