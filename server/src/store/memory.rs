use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::IdentityStore;
use crate::error::{OracleError, Result};
use crate::keys::ExtendedKeys;
use crate::models::{KeySet, User};

/// Identity store held in process memory, for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    inner: RwLock<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    // Keyed by the key set's canonical bytes.
    key_sets: HashMap<Vec<u8>, KeySet>,
}

impl Tables {
    fn live_user(&self, id: Uuid) -> Option<&User> {
        self.users.get(&id).filter(|user| !user.is_deleted)
    }
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a user deleted; lookups stop returning it.
    pub async fn soft_delete(&self, id: Uuid) {
        if let Some(user) = self.inner.write().await.users.get_mut(&id) {
            user.is_deleted = true;
        }
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_user_by_key_set(&self, xpubs: &ExtendedKeys) -> Result<User> {
        let tables = self.inner.read().await;
        tables
            .key_sets
            .get(&xpubs.to_bytes())
            .and_then(|key_set| tables.live_user(key_set.user_id))
            .cloned()
            .ok_or_else(|| OracleError::not_found("user", xpubs))
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<User> {
        self.inner
            .read()
            .await
            .live_user(id)
            .cloned()
            .ok_or_else(|| OracleError::not_found("user", id))
    }

    async fn find_key_set(&self, xpubs: &ExtendedKeys) -> Result<KeySet> {
        let tables = self.inner.read().await;
        tables
            .key_sets
            .get(&xpubs.to_bytes())
            .filter(|key_set| tables.live_user(key_set.user_id).is_some())
            .cloned()
            .ok_or_else(|| OracleError::not_found("key set", xpubs))
    }

    async fn create_user(&self, user: &User) -> Result<()> {
        self.inner
            .write()
            .await
            .users
            .insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut tables = self.inner.write().await;
        let stored = tables
            .users
            .get_mut(&user.id)
            .filter(|stored| !stored.is_deleted)
            .ok_or_else(|| OracleError::not_found("user", user.id))?;
        stored.entity = user.entity.clone();
        stored.date_modified = user.date_modified;
        Ok(())
    }

    async fn create_key_set(&self, key_set: &KeySet) -> Result<()> {
        let mut tables = self.inner.write().await;
        let key = key_set.xpubs.to_bytes();
        if tables.key_sets.contains_key(&key) {
            return Err(OracleError::KeySetExists);
        }
        tables.key_sets.insert(key, key_set.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
