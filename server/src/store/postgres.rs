use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::IdentityStore;
use crate::error::{OracleError, Result};
use crate::keys::{ExtendedKeys, PublicKey};
use crate::models::{KeySet, User};

const USER_COLUMNS: &str =
    "u.id, u.entity, u.public_key, u.date_created, u.date_modified, u.approved, u.is_deleted";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    entity: Vec<u8>,
    public_key: Vec<u8>,
    date_created: DateTime<Utc>,
    date_modified: DateTime<Utc>,
    approved: bool,
    is_deleted: bool,
}

impl TryFrom<UserRow> for User {
    type Error = OracleError;

    fn try_from(row: UserRow) -> Result<Self> {
        let public_key = PublicKey::from_slice(&row.public_key).map_err(|err| {
            OracleError::Malformed {
                what: "stored public key",
                reason: err.to_string(),
            }
        })?;

        Ok(User {
            id: row.id,
            entity: row.entity,
            public_key,
            date_created: row.date_created,
            date_modified: row.date_modified,
            approved: row.approved,
            is_deleted: row.is_deleted,
        })
    }
}

#[derive(sqlx::FromRow)]
struct KeySetRow {
    id: Uuid,
    user_id: Uuid,
    xpub: Vec<u8>,
    required_signers: i32,
    date_created: DateTime<Utc>,
}

impl TryFrom<KeySetRow> for KeySet {
    type Error = OracleError;

    fn try_from(row: KeySetRow) -> Result<Self> {
        let malformed = |reason: String| OracleError::Malformed {
            what: "stored key set",
            reason,
        };
        let xpubs = ExtendedKeys::from_bytes(&row.xpub).map_err(|err| malformed(err.to_string()))?;
        let required_signers =
            u32::try_from(row.required_signers).map_err(|err| malformed(err.to_string()))?;

        Ok(KeySet {
            id: row.id,
            user_id: row.user_id,
            xpubs,
            required_signers,
            date_created: row.date_created,
        })
    }
}

/// Identity store backed by Postgres.
pub struct PgIdentityStore {
    db_pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_user_by_key_set(&self, xpubs: &ExtendedKeys) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users u
            JOIN xpubs x ON x.user_id = u.id
            WHERE x.xpub = $1 AND u.is_deleted = FALSE
            "#
        ))
        .bind(xpubs.to_bytes())
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| OracleError::not_found("user", xpubs))?;

        row.try_into()
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1 AND u.is_deleted = FALSE"
        ))
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| OracleError::not_found("user", id))?;

        row.try_into()
    }

    async fn find_key_set(&self, xpubs: &ExtendedKeys) -> Result<KeySet> {
        let row = sqlx::query_as::<_, KeySetRow>(
            r#"
            SELECT x.id, x.user_id, x.xpub, x.required_signers, x.date_created
            FROM xpubs x
            JOIN users u ON u.id = x.user_id
            WHERE x.xpub = $1 AND u.is_deleted = FALSE
            "#,
        )
        .bind(xpubs.to_bytes())
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| OracleError::not_found("key set", xpubs))?;

        row.try_into()
    }

    async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, entity, public_key, date_created, date_modified, approved, is_deleted
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id)
        .bind(&user.entity)
        .bind(user.public_key.serialize().to_vec())
        .bind(user.date_created)
        .bind(user.date_modified)
        .bind(user.approved)
        .bind(user.is_deleted)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET entity = $2, date_modified = $3
            WHERE id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(user.id)
        .bind(&user.entity)
        .bind(user.date_modified)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OracleError::not_found("user", user.id));
        }
        Ok(())
    }

    async fn create_key_set(&self, key_set: &KeySet) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO xpubs (id, user_id, xpub, required_signers, date_created)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT ON CONSTRAINT xpubs_xpub_unique DO NOTHING
            "#,
        )
        .bind(key_set.id)
        .bind(key_set.user_id)
        .bind(key_set.xpubs.to_bytes())
        .bind(key_set.required_signers as i32)
        .bind(key_set.date_created)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OracleError::KeySetExists);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.db_pool).await?;
        Ok(())
    }
}
