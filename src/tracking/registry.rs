//! Registry of the users the sensor currently reports.
//!
//! One lock guards the whole tracked-user aggregate: ids, calibration states
//! and joints. Callers get snapshots, never the map itself, and no method
//! calls out to the sensor while the lock is held.

use crate::sensor::types::UserId;
use crate::tracking::types::{CalibrationState, TrackingError, User};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Thread-safe map from user id to [`User`].
#[derive(Debug, Default)]
pub struct UserRegistry {
    users: Mutex<HashMap<UserId, User>>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly discovered user.
    pub fn add_user(&self, id: UserId) -> Result<User, TrackingError> {
        let mut users = self.users.lock();
        if users.contains_key(&id) {
            return Err(TrackingError::DuplicateUser(id));
        }

        let user = User::new(id);
        users.insert(id, user.clone());
        Ok(user)
    }

    /// Remove a user, returning its last state.
    pub fn remove_user(&self, id: UserId) -> Option<User> {
        self.users.lock().remove(&id)
    }

    /// Snapshot of a user.
    pub fn find_user(&self, id: UserId) -> Option<User> {
        self.users.lock().get(&id).cloned()
    }

    pub fn contains(&self, id: UserId) -> bool {
        self.users.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.lock().is_empty()
    }

    /// Ids of every registered user, ascending.
    pub fn ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.users.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Ids of users in the Tracking state, ascending.
    pub fn tracked_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self
            .users
            .lock()
            .values()
            .filter(|user| user.is_tracking())
            .map(User::id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Snapshot of every user, ordered by id.
    pub fn snapshot(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.lock().values().cloned().collect();
        users.sort_by_key(User::id);
        users
    }

    /// Move a user to `state` and return the updated snapshot, or `None`
    /// if the user is not registered.
    pub fn set_state(&self, id: UserId, state: CalibrationState) -> Option<User> {
        let mut users = self.users.lock();
        let user = users.get_mut(&id)?;
        user.set_state(state);
        Some(user.clone())
    }

    /// Run `f` on every Tracking user under a single lock acquisition.
    ///
    /// `f` must not call back into the registry; it would deadlock.
    pub fn for_each_tracked_user<F>(&self, mut f: F)
    where
        F: FnMut(&mut User),
    {
        let mut users = self.users.lock();
        for user in users.values_mut().filter(|user| user.is_tracking()) {
            f(user);
        }
    }

    /// Remove every user, returning them ordered by id.
    pub fn drain(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.lock().drain().map(|(_, user)| user).collect();
        users.sort_by_key(User::id);
        users
    }
}
