//! The user registry: nickname → user record.

use std::collections::HashMap;
use std::sync::Arc;

use gossip_proto::irc_to_lower;
use tokio::sync::RwLock;

use crate::error::StateError;
use crate::state::user::User;

/// Nickname-keyed registry of user records.
///
/// The whole map sits behind one reader-writer lock so that `rename` is
/// observationally atomic: a concurrent lookup sees the old mapping or
/// the new one, never both and never neither.
#[derive(Default)]
pub struct UserManager {
    users: RwLock<HashMap<String, Arc<RwLock<User>>>>,
}

impl UserManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new user keyed by its nickname.
    pub async fn add(&self, user: User) -> Result<Arc<RwLock<User>>, StateError> {
        let key = irc_to_lower(&user.nick);
        let mut users = self.users.write().await;
        if users.contains_key(&key) {
            return Err(StateError::AlreadyExists);
        }
        let user = Arc::new(RwLock::new(user));
        users.insert(key, Arc::clone(&user));
        Ok(user)
    }

    pub async fn get(&self, nick: &str) -> Option<Arc<RwLock<User>>> {
        self.users.read().await.get(&irc_to_lower(nick)).cloned()
    }

    pub async fn exists(&self, nick: &str) -> bool {
        self.users.read().await.contains_key(&irc_to_lower(nick))
    }

    pub async fn remove(&self, nick: &str) -> Result<Arc<RwLock<User>>, StateError> {
        self.users
            .write()
            .await
            .remove(&irc_to_lower(nick))
            .ok_or(StateError::NotFound)
    }

    /// Move a user to a new nickname.
    ///
    /// The map write lock is held across the remove/insert pair and the
    /// record's own nick field is rewritten before the lock drops, so no
    /// observer can catch the registry between the two names.
    pub async fn rename(&self, old: &str, new: &str) -> Result<Arc<RwLock<User>>, StateError> {
        let old_key = irc_to_lower(old);
        let new_key = irc_to_lower(new);

        let mut users = self.users.write().await;
        if old_key != new_key && users.contains_key(&new_key) {
            return Err(StateError::AlreadyExists);
        }
        let user = users.remove(&old_key).ok_or(StateError::NotFound)?;
        user.write().await.nick = new.to_string();
        users.insert(new_key, Arc::clone(&user));
        Ok(user)
    }

    pub async fn list(&self) -> Vec<Arc<RwLock<User>>> {
        self.users.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_enforces_uniqueness() {
        let users = UserManager::new();
        users.add(User::new("alice")).await.unwrap();
        assert_eq!(
            users.add(User::new("alice")).await.unwrap_err(),
            StateError::AlreadyExists
        );
        // Case-insensitive under the IRC casemapping
        assert_eq!(
            users.add(User::new("ALICE")).await.unwrap_err(),
            StateError::AlreadyExists
        );
    }

    #[tokio::test]
    async fn rename_moves_exactly_one_mapping() {
        let users = UserManager::new();
        let alice = users.add(User::new("alice")).await.unwrap();

        let renamed = users.rename("alice", "alicia").await.unwrap();
        assert!(Arc::ptr_eq(&alice, &renamed));

        assert!(users.get("alice").await.is_none());
        let found = users.get("alicia").await.unwrap();
        assert!(Arc::ptr_eq(&alice, &found));
        assert_eq!(found.read().await.nick, "alicia");
    }

    #[tokio::test]
    async fn rename_fails_on_occupied_or_missing() {
        let users = UserManager::new();
        users.add(User::new("alice")).await.unwrap();
        users.add(User::new("bob")).await.unwrap();

        assert_eq!(
            users.rename("alice", "bob").await.unwrap_err(),
            StateError::AlreadyExists
        );
        assert_eq!(
            users.rename("carol", "dave").await.unwrap_err(),
            StateError::NotFound
        );
    }

    #[tokio::test]
    async fn rename_to_own_nick_changes_case() {
        let users = UserManager::new();
        users.add(User::new("alice")).await.unwrap();

        let user = users.rename("alice", "Alice").await.unwrap();
        assert_eq!(user.read().await.nick, "Alice");
        assert!(users.exists("alice").await);
    }

    #[tokio::test]
    async fn remove_reports_missing_users() {
        let users = UserManager::new();
        users.add(User::new("alice")).await.unwrap();
        assert!(users.remove("alice").await.is_ok());
        assert_eq!(users.remove("alice").await.unwrap_err(), StateError::NotFound);
        assert_eq!(users.len().await, 0);
    }
}
