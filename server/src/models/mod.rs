//! Data models for the identity oracle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::chain::Hash32;
use crate::error::{OracleError, Result};
use crate::keys::{ExtendedKeys, PublicKey};

pub mod entity;
pub mod formation;

pub use entity::{AdministratorField, EntityField, ManagerField};
pub use formation::ContractFormation;

/// A registered identity.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    /// Serialized [`EntityField`].
    pub entity: Vec<u8>,
    pub public_key: PublicKey,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    pub approved: bool,
    pub is_deleted: bool,
}

impl User {
    pub fn new(entity: &EntityField, public_key: PublicKey) -> Result<Self> {
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            entity: serde_json::to_vec(entity)?,
            public_key,
            date_created: now,
            date_modified: now,
            approved: true,
            is_deleted: false,
        })
    }

    pub fn entity(&self) -> Result<EntityField> {
        serde_json::from_slice(&self.entity).map_err(|err| OracleError::Malformed {
            what: "stored entity",
            reason: err.to_string(),
        })
    }

    pub fn set_entity(&mut self, entity: &EntityField) -> Result<()> {
        self.entity = serde_json::to_vec(entity)?;
        self.date_modified = Utc::now();
        Ok(())
    }
}

/// A set of extended public keys registered to a user.
#[derive(Debug, Clone, PartialEq)]
pub struct KeySet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub xpubs: ExtendedKeys,
    pub required_signers: u32,
    pub date_created: DateTime<Utc>,
}

impl KeySet {
    pub fn new(user_id: Uuid, xpubs: ExtendedKeys, required_signers: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            xpubs,
            required_signers,
            date_created: Utc::now(),
        }
    }
}

/// The digest an attestation signs, with the context a caller needs to
/// reproduce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHash {
    pub hash: Hash32,
    pub block_height: u32,
    pub approved: bool,
    pub description: String,
}

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Request DTO for registering a new identity
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    pub entity: EntityField,
    #[validate(length(equal = 66))]
    pub public_key: String,
    #[validate(length(min = 16, max = 146))]
    pub signature: String,
}

/// Request DTO for attaching a key set to a user
#[derive(Debug, Deserialize, Validate)]
pub struct AddXPubRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1))]
    pub xpubs: String,
    #[validate(range(min = 1, max = 255))]
    pub required_signers: u32,
    #[validate(length(min = 16, max = 146))]
    pub signature: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FindUserRequest {
    #[validate(length(min = 1))]
    pub xpubs: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateIdentityRequest {
    pub user_id: Uuid,
    pub entity: EntityField,
    #[validate(length(min = 16, max = 146))]
    pub signature: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPubKeyRequest {
    pub entity: EntityField,
    #[validate(length(min = 1))]
    pub xpub: String,
    pub index: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyXPubRequest {
    pub entity: EntityField,
    #[validate(length(min = 1))]
    pub xpubs: String,
}

/// Request DTO for an administrator certificate. Exactly one of `entity` and
/// `entity_contract` must be given.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyAdminRequest {
    #[validate(length(min = 1))]
    pub xpubs: String,
    pub index: u32,
    pub entity: Option<EntityField>,
    pub entity_contract: Option<String>,
    /// Nanoseconds since the unix epoch.
    pub expiration: Option<u64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TransferApproveRequest {
    #[validate(length(min = 1))]
    pub contract: String,
    #[validate(length(min = 4))]
    pub instrument_id: String,
    #[validate(length(min = 1))]
    pub xpubs: String,
    pub index: u32,
    pub expiration: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OracleIdentityResponse {
    pub public_key: String,
    pub contract_address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub approved: bool,
    pub status: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeySetResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub required_signers: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserIdResponse {
    pub user_id: Uuid,
}

/// Outcome of an attestation request. Signed fields are absent when the
/// approver rejected the request.
#[derive(Debug, Serialize, Deserialize)]
pub struct AttestationResponse {
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub headers: String,
}
