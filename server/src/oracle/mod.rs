//! Attestation engine.
//!
//! Resolves the registered identity behind a key or key set, consults the
//! approver, checks the claimed entity against the registered one, and binds
//! the result to a confirmation-deep block hash. The engine produces the
//! digest; signing it with the oracle key is a separate step so callers can
//! log or inspect the digest first.

mod entity;
pub mod sighash;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::approver::{AllowAll, Approval, Approver};
use crate::chain::Hash32;
use crate::contracts::FormationSource;
use crate::error::{with_cancel, OracleError, Result};
use crate::keys::{
    verify_signature, ExtendedKey, ExtendedKeys, InstrumentId, KeyError, Network, OracleKey,
    PublicKey, RawAddress,
};
use crate::models::{EntityField, KeySet, SignatureHash, User};
use crate::store::IdentityStore;
use crate::tracker::HeaderSource;

pub use entity::{verify_entity_is_subset, EntityMismatch};
pub use sighash::AdminTarget;

pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, Clone)]
pub struct OracleSettings {
    pub network: Network,
    pub transfer_expiration: Duration,
    pub identity_expiration: Duration,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            transfer_expiration: DEFAULT_EXPIRATION,
            identity_expiration: DEFAULT_EXPIRATION,
        }
    }
}

/// Result of an attestation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attestation {
    /// A digest ready to sign. `sig_hash.approved` may still be false when the
    /// claimed entity did not match.
    Signed {
        sig_hash: SignatureHash,
        /// Nanoseconds since the unix epoch, for certificates that expire.
        expiration: Option<u64>,
    },
    /// The approver refused; nothing is signed.
    Rejected { description: String },
}

/// Result of a registration-side operation the approver can refuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision<T> {
    Accepted(T),
    Rejected { description: String },
}

#[derive(Debug, Clone)]
pub struct AdminCertificateRequest {
    pub xpubs: ExtendedKeys,
    pub index: u32,
    pub target: AdminTarget,
    pub expiration: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub contract: RawAddress,
    pub instrument: InstrumentId,
    pub xpubs: ExtendedKeys,
    pub index: u32,
    pub expiration: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct OracleIdentity {
    pub public_key: PublicKey,
    pub contract_address: Option<RawAddress>,
}

pub struct Oracle {
    store: Arc<dyn IdentityStore>,
    headers: Arc<dyn HeaderSource>,
    contracts: Arc<dyn FormationSource>,
    approver: Arc<dyn Approver>,
    key: OracleKey,
    contract_address: Option<RawAddress>,
    settings: OracleSettings,
}

impl Oracle {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        headers: Arc<dyn HeaderSource>,
        contracts: Arc<dyn FormationSource>,
        key: OracleKey,
        settings: OracleSettings,
    ) -> Self {
        Self {
            store,
            headers,
            contracts,
            approver: Arc::new(AllowAll),
            key,
            contract_address: None,
            settings,
        }
    }

    pub fn with_approver(mut self, approver: Arc<dyn Approver>) -> Self {
        self.approver = approver;
        self
    }

    pub fn with_contract_address(mut self, address: RawAddress) -> Self {
        self.contract_address = Some(address);
        self
    }

    pub fn network(&self) -> Network {
        self.settings.network
    }

    pub fn identity(&self) -> OracleIdentity {
        OracleIdentity {
            public_key: self.key.public_key(),
            contract_address: self.contract_address.clone(),
        }
    }

    /// DER signature by the oracle key over an attestation digest.
    pub fn sign(&self, sig_hash: &SignatureHash) -> Vec<u8> {
        self.key.sign(&sig_hash.hash)
    }

    pub async fn ping_store(&self) -> Result<()> {
        self.store.ping().await
    }

    /// Attests that the key at `xpub/index` belongs to an identity matching
    /// `entity`.
    pub async fn verify_pub_key(
        &self,
        cancel: &CancellationToken,
        entity: &EntityField,
        xpub: &ExtendedKey,
        index: u32,
    ) -> Result<Attestation> {
        let user = self.user_for(cancel, &ExtendedKeys::single(xpub.clone())).await?;
        let registered = user.entity()?;

        let approval = self.identity_approval(cancel, user.id).await?;
        if !approval.approved {
            info!(user_id = %user.id, "public key attestation rejected by approver");
            return Ok(Attestation::Rejected {
                description: approval.description,
            });
        }

        let (approved, description) = match_entity(entity, &registered, approval.description);
        let child = xpub.child_key(index)?.public_key();
        let (block_hash, block_height) = self.recent_sig_hash(cancel).await?;
        let hash = sighash::entity_pub_key(entity, &child, &block_hash, approved);

        info!(
            user_id = %user.id,
            index,
            approved,
            block_height,
            "public key attestation"
        );
        Ok(Attestation::Signed {
            sig_hash: SignatureHash {
                hash,
                block_height,
                approved,
                description,
            },
            expiration: None,
        })
    }

    /// Attests that a whole key set belongs to an identity matching `entity`.
    pub async fn verify_xpub(
        &self,
        cancel: &CancellationToken,
        entity: &EntityField,
        xpubs: &ExtendedKeys,
    ) -> Result<Attestation> {
        let user = self.user_for(cancel, xpubs).await?;
        let registered = user.entity()?;

        let approval = self.identity_approval(cancel, user.id).await?;
        if !approval.approved {
            info!(user_id = %user.id, "key set attestation rejected by approver");
            return Ok(Attestation::Rejected {
                description: approval.description,
            });
        }

        let (approved, description) = match_entity(entity, &registered, approval.description);
        let (block_hash, block_height) = self.recent_sig_hash(cancel).await?;
        let hash = sighash::entity_xpub(entity, xpubs, &block_hash, approved);

        info!(user_id = %user.id, approved, block_height, "key set attestation");
        Ok(Attestation::Signed {
            sig_hash: SignatureHash {
                hash,
                block_height,
                approved,
                description,
            },
            expiration: None,
        })
    }

    /// Certifies the address derived from `xpubs/index` as an administrator of
    /// the given entity, or of the issuer a contract published.
    pub async fn create_admin_certificate(
        &self,
        cancel: &CancellationToken,
        request: &AdminCertificateRequest,
    ) -> Result<Attestation> {
        let user = self.user_for(cancel, &request.xpubs).await?;
        let registered = user.entity()?;
        let key_set = self.key_set_for(cancel, &request.xpubs).await?;

        let approval = self.identity_approval(cancel, user.id).await?;
        if !approval.approved {
            info!(user_id = %user.id, "admin certificate rejected by approver");
            return Ok(Attestation::Rejected {
                description: approval.description,
            });
        }

        let admin_keys = request.xpubs.child_keys(request.index)?;
        let admin_address = RawAddress::from_keys(&admin_keys, key_set.required_signers)?;

        let (approved, description) = match &request.target {
            AdminTarget::Entity(entity) => match_entity(entity, &registered, approval.description),
            AdminTarget::Contract(contract) => {
                let formation = self.contracts.contract_formation(cancel, contract).await?;
                match formation.issuer {
                    Some(issuer) => match_entity(&issuer, &registered, approval.description),
                    None => (false, "Contract formation has no issuer".to_string()),
                }
            }
        };

        let (block_hash, block_height) = self.recent_sig_hash(cancel).await?;
        let expiration = request
            .expiration
            .unwrap_or_else(|| expires_in(self.settings.identity_expiration));
        let hash = sighash::contract_admin_identity(
            &admin_address,
            &request.target,
            &block_hash,
            expiration,
            approved,
        );

        info!(
            user_id = %user.id,
            admin_address = %admin_address.encode(self.settings.network),
            block_hash = %block_hash,
            expiration,
            approved,
            "admin certificate"
        );
        Ok(Attestation::Signed {
            sig_hash: SignatureHash {
                hash,
                block_height,
                approved,
                description,
            },
            expiration: Some(expiration),
        })
    }

    /// Approves receipt of an instrument at the address derived from
    /// `xpubs/index`.
    pub async fn create_receive_signature(
        &self,
        cancel: &CancellationToken,
        request: &TransferRequest,
    ) -> Result<Attestation> {
        let user = self.user_for(cancel, &request.xpubs).await?;
        let key_set = self.key_set_for(cancel, &request.xpubs).await?;

        let contract = request.contract.encode(self.settings.network);
        let instrument = request.instrument.to_string();
        let approval = with_cancel(
            cancel,
            "approve transfer",
            self.approver.approve_transfer(&contract, &instrument, user.id),
        )
        .await?;
        if !approval.approved {
            info!(user_id = %user.id, contract = %contract, "transfer rejected by approver");
            return Ok(Attestation::Rejected {
                description: approval.description,
            });
        }

        let (block_hash, block_height) = self.recent_sig_hash(cancel).await?;
        let receive_keys = request.xpubs.child_keys(request.index)?;
        let receive_address = RawAddress::from_keys(&receive_keys, key_set.required_signers)?;
        let expiration = request
            .expiration
            .unwrap_or_else(|| expires_in(self.settings.transfer_expiration));

        let hash = sighash::transfer(
            &request.contract,
            &request.instrument.code,
            &receive_address,
            &block_hash,
            expiration,
            true,
        );

        info!(
            user_id = %user.id,
            contract = %contract,
            instrument = %instrument,
            receive_address = %receive_address.encode(self.settings.network),
            block_hash = %block_hash,
            expiration,
            "transfer certificate"
        );
        Ok(Attestation::Signed {
            sig_hash: SignatureHash {
                hash,
                block_height,
                approved: true,
                description: approval.description,
            },
            expiration: Some(expiration),
        })
    }

    /// Registers a new identity. `signature` must be by `public_key` over the
    /// entity.
    pub async fn register(
        &self,
        cancel: &CancellationToken,
        entity: &EntityField,
        public_key: PublicKey,
        signature: &[u8],
    ) -> Result<Decision<Uuid>> {
        if !verify_signature(&sighash::registration(entity), signature, &public_key) {
            return Err(OracleError::InvalidSignature);
        }

        let user = User::new(entity, public_key)?;
        let approval = with_cancel(
            cancel,
            "approve registration",
            self.approver.approve_registration(user.id, entity, &public_key),
        )
        .await?;
        if !approval.approved {
            info!(public_key = %public_key, "registration rejected by approver");
            return Ok(Decision::Rejected {
                description: approval.description,
            });
        }

        with_cancel(cancel, "create user", self.store.create_user(&user)).await?;
        info!(user_id = %user.id, public_key = %public_key, "created user");
        Ok(Decision::Accepted(user.id))
    }

    /// Attaches a key set to a user. `signature` must be by the user's
    /// registered key.
    pub async fn add_key_set(
        &self,
        cancel: &CancellationToken,
        user_id: Uuid,
        xpubs: ExtendedKeys,
        required_signers: u32,
        signature: &[u8],
    ) -> Result<KeySet> {
        if required_signers == 0 || required_signers as usize > xpubs.len() {
            return Err(KeyError::RequiredSigners {
                required: required_signers,
                available: xpubs.len(),
            }
            .into());
        }

        let user = with_cancel(cancel, "find user", self.store.find_user_by_id(user_id)).await?;
        let digest = sighash::add_key_set(&user_id, &xpubs, required_signers);
        if !verify_signature(&digest, signature, &user.public_key) {
            return Err(OracleError::InvalidSignature);
        }

        let key_set = KeySet::new(user_id, xpubs, required_signers);
        with_cancel(cancel, "create key set", self.store.create_key_set(&key_set)).await?;
        info!(user_id = %user_id, xpubs = %key_set.xpubs, required_signers, "added key set");
        Ok(key_set)
    }

    pub async fn find_user_id(
        &self,
        cancel: &CancellationToken,
        xpubs: &ExtendedKeys,
    ) -> Result<Uuid> {
        Ok(self.user_for(cancel, xpubs).await?.id)
    }

    /// Replaces a user's registered entity. `signature` must be by the user's
    /// registered key.
    pub async fn update_identity(
        &self,
        cancel: &CancellationToken,
        user_id: Uuid,
        entity: &EntityField,
        signature: &[u8],
    ) -> Result<Decision<()>> {
        let mut user = with_cancel(cancel, "find user", self.store.find_user_by_id(user_id)).await?;
        if !verify_signature(
            &sighash::update_identity(&user_id, entity),
            signature,
            &user.public_key,
        ) {
            return Err(OracleError::InvalidSignature);
        }

        let approval = with_cancel(
            cancel,
            "approve identity update",
            self.approver.update_identity(user_id, entity),
        )
        .await?;
        if !approval.approved {
            info!(user_id = %user_id, "identity update rejected by approver");
            return Ok(Decision::Rejected {
                description: approval.description,
            });
        }

        user.set_entity(entity)?;
        with_cancel(cancel, "update user", self.store.update_user(&user)).await?;
        info!(user_id = %user_id, "updated identity");
        Ok(Decision::Accepted(()))
    }

    async fn user_for(&self, cancel: &CancellationToken, xpubs: &ExtendedKeys) -> Result<User> {
        with_cancel(cancel, "find user", self.store.find_user_by_key_set(xpubs)).await
    }

    async fn key_set_for(&self, cancel: &CancellationToken, xpubs: &ExtendedKeys) -> Result<KeySet> {
        with_cancel(cancel, "find key set", self.store.find_key_set(xpubs)).await
    }

    async fn identity_approval(&self, cancel: &CancellationToken, user_id: Uuid) -> Result<Approval> {
        with_cancel(cancel, "approve identity", self.approver.approve_identity(user_id)).await
    }

    async fn recent_sig_hash(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(Hash32, u32)> {
        with_cancel(cancel, "recent sig hash", self.headers.recent_sig_hash()).await
    }
}

/// Subset check outcome as `(approved, description)`. An approver's note is
/// kept only when the entity matches.
fn match_entity(claimed: &EntityField, registered: &EntityField, note: String) -> (bool, String) {
    match verify_entity_is_subset(claimed, registered) {
        Ok(()) => (true, note),
        Err(mismatch) => (false, mismatch.to_string()),
    }
}

fn expires_in(duration: Duration) -> u64 {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or_default().max(0) as u64;
    now.saturating_add(duration.as_nanos().min(u128::from(u64::MAX)) as u64)
}
