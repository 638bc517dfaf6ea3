//! In-memory user store
//!
//! Users are keyed by user name; lookups ignore ASCII case.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::reward_set::UserReward;
use super::user::{NewUser, User};
use crate::error::{Error, Result};
use crate::geo::Coordinate;

#[derive(Debug, Default)]
pub struct UserRepository {
    users: RwLock<HashMap<String, Arc<User>>>,
}

impl UserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let users = users
            .into_iter()
            .map(|user| (user.user_name.clone(), Arc::new(user)))
            .collect();
        Self {
            users: RwLock::new(users),
        }
    }

    pub fn get_user(&self, user_name: &str) -> Result<Arc<User>> {
        let users = self.users.read();
        if let Some(user) = users.get(user_name) {
            return Ok(Arc::clone(user));
        }
        users
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(user_name))
            .map(|(_, user)| Arc::clone(user))
            .ok_or_else(|| {
                warn!("User with userName {} was not found", user_name);
                Error::user_not_found(user_name)
            })
    }

    /// Registers a user under a fresh id
    pub fn add_user(&self, new_user: NewUser) -> Result<Arc<User>> {
        if new_user.user_name.trim().is_empty() {
            return Err(Error::invalid_argument("userName must not be empty"));
        }

        let mut users = self.users.write();
        if users
            .keys()
            .any(|name| name.eq_ignore_ascii_case(&new_user.user_name))
        {
            warn!("User with userName {} already exists", new_user.user_name);
            return Err(Error::UserAlreadyExists {
                user_name: new_user.user_name,
            });
        }

        let user = Arc::new(User::new(
            Uuid::new_v4(),
            new_user.user_name,
            new_user.phone_number,
            new_user.email_address,
        ));
        users.insert(user.user_name.clone(), Arc::clone(&user));
        info!("Registered user {} ({})", user.user_name, user.user_id);

        Ok(user)
    }

    pub fn all_users(&self) -> Vec<Arc<User>> {
        self.users.read().values().cloned().collect()
    }

    /// Last known coordinate of every user that has one
    pub fn all_current_locations(&self) -> HashMap<Uuid, Coordinate> {
        self.users
            .read()
            .values()
            .filter_map(|user| {
                user.last_visited_location()
                    .map(|visit| (user.user_id, visit.location))
            })
            .collect()
    }

    pub fn get_user_rewards(&self, user_name: &str) -> Result<Vec<UserReward>> {
        Ok(self.get_user(user_name)?.user_rewards())
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::VisitedLocation;
    use chrono::Utc;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            user_name: name.to_string(),
            phone_number: "000".to_string(),
            email_address: format!("{}@tourGuide.com", name),
        }
    }

    #[test]
    fn test_lookup_ignores_case() {
        let repo = UserRepository::new();
        let added = repo.add_user(new_user("internalUser1")).unwrap();

        let found = repo.get_user("INTERNALUSER1").unwrap();
        assert_eq!(found.user_id, added.user_id);
    }

    #[test]
    fn test_missing_user() {
        let repo = UserRepository::new();
        let err = repo.get_user("ghost").unwrap_err();
        assert!(matches!(err, Error::UserNotFound { .. }));
        assert!(matches!(
            repo.get_user_rewards("ghost").unwrap_err(),
            Error::UserNotFound { .. }
        ));
    }

    #[test]
    fn test_duplicate_user_rejected() {
        let repo = UserRepository::new();
        repo.add_user(new_user("jon")).unwrap();
        let err = repo.add_user(new_user("Jon")).unwrap_err();
        assert!(matches!(err, Error::UserAlreadyExists { .. }));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_empty_user_name_rejected() {
        let repo = UserRepository::new();
        assert!(matches!(
            repo.add_user(new_user("  ")).unwrap_err(),
            Error::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_current_locations_skip_users_without_history() {
        let repo = UserRepository::new();
        let traveller = repo.add_user(new_user("traveller")).unwrap();
        repo.add_user(new_user("homebody")).unwrap();

        let here = Coordinate::new(40.741112, -73.989723);
        traveller.add_visited_location(VisitedLocation::new(traveller.user_id, here, Utc::now()));

        let locations = repo.all_current_locations();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[&traveller.user_id], here);
    }
}
