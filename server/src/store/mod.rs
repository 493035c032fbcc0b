//! Persistence for registered users and their key sets.

mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::keys::ExtendedKeys;
use crate::models::{KeySet, User};

pub use memory::MemoryIdentityStore;
pub use postgres::PgIdentityStore;

/// Lookups and writes the oracle needs. Soft-deleted users are never
/// returned; a missing record is `OracleError::NotFound`.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_user_by_key_set(&self, xpubs: &ExtendedKeys) -> Result<User>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<User>;

    async fn find_key_set(&self, xpubs: &ExtendedKeys) -> Result<KeySet>;

    async fn create_user(&self, user: &User) -> Result<()>;

    /// Persists a changed entity and modification time.
    async fn update_user(&self, user: &User) -> Result<()>;

    /// Fails with `OracleError::KeySetExists` when the keys are already
    /// registered to any user.
    async fn create_key_set(&self, key_set: &KeySet) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}
