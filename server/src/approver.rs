//! External approval hooks consulted before the oracle registers a user,
//! changes an identity, or signs an attestation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OracleError, Result};
use crate::keys::PublicKey;
use crate::models::EntityField;

/// An approver's verdict. The description is passed back to the caller
/// whether or not the request was approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub approved: bool,
    #[serde(default)]
    pub description: String,
}

impl Approval {
    pub fn approved() -> Self {
        Self {
            approved: true,
            description: String::new(),
        }
    }

    pub fn rejected(description: impl Into<String>) -> Self {
        Self {
            approved: false,
            description: description.into(),
        }
    }
}

/// Business-policy hooks. An `Err` aborts the request; a rejection is a
/// normal outcome reported to the caller.
#[async_trait]
pub trait Approver: Send + Sync {
    async fn approve_registration(
        &self,
        user_id: Uuid,
        entity: &EntityField,
        public_key: &PublicKey,
    ) -> Result<Approval>;

    async fn update_identity(&self, user_id: Uuid, entity: &EntityField) -> Result<Approval>;

    async fn approve_identity(&self, user_id: Uuid) -> Result<Approval>;

    async fn approve_transfer(
        &self,
        contract: &str,
        instrument_id: &str,
        user_id: Uuid,
    ) -> Result<Approval>;
}

/// Approves everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl Approver for AllowAll {
    async fn approve_registration(&self, _: Uuid, _: &EntityField, _: &PublicKey) -> Result<Approval> {
        Ok(Approval::approved())
    }

    async fn update_identity(&self, _: Uuid, _: &EntityField) -> Result<Approval> {
        Ok(Approval::approved())
    }

    async fn approve_identity(&self, _: Uuid) -> Result<Approval> {
        Ok(Approval::approved())
    }

    async fn approve_transfer(&self, _: &str, _: &str, _: Uuid) -> Result<Approval> {
        Ok(Approval::approved())
    }
}

/// Forwards each hook as a JSON `POST` to `{base_url}/{hook}`.
pub struct RemoteApprover {
    base_url: String,
    http: Client,
}

#[derive(Serialize)]
struct RegistrationBody<'a> {
    user_id: Uuid,
    entity: &'a EntityField,
    public_key: String,
}

#[derive(Serialize)]
struct IdentityBody<'a> {
    user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity: Option<&'a EntityField>,
}

#[derive(Serialize)]
struct TransferBody<'a> {
    contract: &'a str,
    instrument_id: &'a str,
    user_id: Uuid,
}

impl RemoteApprover {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    async fn post<B: Serialize + Sync>(&self, hook: &'static str, body: &B) -> Result<Approval> {
        let failed = |err: reqwest::Error| OracleError::Approver {
            hook,
            reason: err.to_string(),
        };

        self.http
            .post(format!("{}/{hook}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(failed)?
            .error_for_status()
            .map_err(failed)?
            .json::<Approval>()
            .await
            .map_err(failed)
    }
}

#[async_trait]
impl Approver for RemoteApprover {
    async fn approve_registration(
        &self,
        user_id: Uuid,
        entity: &EntityField,
        public_key: &PublicKey,
    ) -> Result<Approval> {
        let body = RegistrationBody {
            user_id,
            entity,
            public_key: public_key.to_string(),
        };
        self.post("registration", &body).await
    }

    async fn update_identity(&self, user_id: Uuid, entity: &EntityField) -> Result<Approval> {
        let body = IdentityBody {
            user_id,
            entity: Some(entity),
        };
        self.post("identity/update", &body).await
    }

    async fn approve_identity(&self, user_id: Uuid) -> Result<Approval> {
        let body = IdentityBody {
            user_id,
            entity: None,
        };
        self.post("identity", &body).await
    }

    async fn approve_transfer(
        &self,
        contract: &str,
        instrument_id: &str,
        user_id: Uuid,
    ) -> Result<Approval> {
        let body = TransferBody {
            contract,
            instrument_id,
            user_id,
        };
        self.post("transfer", &body).await
    }
}
