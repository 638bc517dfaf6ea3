//! Generated users for local runs and load testing.

use chrono::{Duration, Utc};
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use super::ledger::VisitedLocation;
use super::user::User;
use crate::geo::Coordinate;

/// Web-Mercator latitude limit
const MAX_LATITUDE: f64 = 85.05112878;
const MAX_LONGITUDE: f64 = 180.0;
const LOCATIONS_PER_USER: usize = 3;
const HISTORY_DAYS: i64 = 30;

/// Builds `count` users named `internalUser{i}`, each with a short random location history
pub fn generate_internal_users(count: usize) -> Vec<User> {
    let mut rng = rand::thread_rng();
    let users: Vec<User> = (0..count)
        .map(|i| {
            let user_name = format!("internalUser{}", i);
            let email = format!("{}@tourGuide.com", user_name);
            let user = User::new(Uuid::new_v4(), user_name, "000", email);
            for _ in 0..LOCATIONS_PER_USER {
                user.add_visited_location(random_visit(&mut rng, user.user_id));
            }
            user
        })
        .collect();

    debug!("Created {} internal test users.", users.len());
    users
}

pub fn random_coordinate(rng: &mut impl Rng) -> Coordinate {
    Coordinate::new(
        rng.gen_range(-MAX_LATITUDE..=MAX_LATITUDE),
        rng.gen_range(-MAX_LONGITUDE..=MAX_LONGITUDE),
    )
}

fn random_visit(rng: &mut impl Rng, user_id: Uuid) -> VisitedLocation {
    let days_ago = rng.gen_range(0..HISTORY_DAYS);
    VisitedLocation::new(
        user_id,
        random_coordinate(rng),
        Utc::now() - Duration::days(days_ago),
    )
}
