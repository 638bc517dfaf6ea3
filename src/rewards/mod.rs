//! Rewards Module
//!
//! Turns visited locations into reward points.
//!
//! ## Architecture
//!
//! 1. **Proximity** - Runtime-tunable reward distance threshold
//! 2. **Oracle** - Narrow interface to the external points authority, wrapped by an adapter
//! 3. **Engine** - Per-user scan: visits x attractions, first qualifying visit wins
//! 4. **Coordinator** - Bounded worker pool running the engine over many users
//!
//! ## Qualification
//!
//! A visit qualifies for an attraction when its distance is at most the
//! proximity buffer (boundary included). Each attraction is rewarded at most
//! once per user, tied to the earliest qualifying visit in ledger order.

pub mod coordinator;
pub mod engine;
pub mod metrics;
pub mod oracle;
pub mod proximity;

pub use coordinator::{BatchReport, RewardCoordinator, RewardFailure};
pub use engine::{PairFailure, RewardEngine, RewardScan};
pub use oracle::{
    BasePointsOracle, HttpRewardsOracle, OracleAdapter, RewardPointsOracle,
    SimulatedRewardsCentral,
};
pub use proximity::ProximitySettings;
