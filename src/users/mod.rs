//! Users Module
//!
//! Users own two records: an append-only ledger of visited locations and a
//! reward set keyed by attraction.
//!
//! ## Ownership
//!
//! - The ledger is appended to by the location tracker and read as snapshots.
//! - The reward set is written only through a [`RewardClaim`], which at most one
//!   worker holds per user at a time.

pub mod internal;
pub mod ledger;
pub mod repository;
pub mod reward_set;
pub mod user;

pub use ledger::{LocationLedger, VisitedLocation};
pub use repository::UserRepository;
pub use reward_set::{RewardSet, UserReward};
pub use user::{NewUser, RewardClaim, User};
