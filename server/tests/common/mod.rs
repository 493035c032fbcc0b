#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bitcoin::secp256k1::SecretKey;
use bitcoin::{block, CompactTarget};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use identity_oracle::approver::{Approval, Approver};
use identity_oracle::chain::{BlockHeader, Hash32, HeaderIds};
use identity_oracle::contracts::{ContractFormationCache, MemoryFormationStorage};
use identity_oracle::feed::{HeaderFeed, MemoryFeed};
use identity_oracle::keys::{ExtendedKey, ExtendedKeys, Network, OracleKey, PublicKey};
use identity_oracle::models::{AdministratorField, EntityField};
use identity_oracle::oracle::{sighash, Decision, Oracle, OracleSettings};
use identity_oracle::store::MemoryIdentityStore;
use identity_oracle::tracker::HeaderTracker;
use identity_oracle::Result;

pub const OFFSET: usize = 5;

/// Approver whose answer tests can change between calls.
#[derive(Debug, Default)]
pub struct ScriptedApprover {
    rejection: Mutex<Option<String>>,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedApprover {
    pub fn reject(&self, description: &str) {
        *self.rejection.lock().unwrap() = Some(description.to_string());
    }

    pub fn approve(&self) {
        *self.rejection.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, hook: &'static str) -> Result<Approval> {
        self.calls.lock().unwrap().push(hook);
        Ok(match self.rejection.lock().unwrap().as_ref() {
            Some(description) => Approval::rejected(description.clone()),
            None => Approval::approved(),
        })
    }
}

#[async_trait]
impl Approver for ScriptedApprover {
    async fn approve_registration(&self, _: Uuid, _: &EntityField, _: &PublicKey) -> Result<Approval> {
        self.answer("registration")
    }

    async fn update_identity(&self, _: Uuid, _: &EntityField) -> Result<Approval> {
        self.answer("identity/update")
    }

    async fn approve_identity(&self, _: Uuid) -> Result<Approval> {
        self.answer("identity")
    }

    async fn approve_transfer(&self, _: &str, _: &str, _: Uuid) -> Result<Approval> {
        self.answer("transfer")
    }
}

pub fn build_chain(count: usize) -> Vec<BlockHeader> {
    build_branch(Hash32::default(), count, 0)
}

/// `count` headers following `parent`; `salt` separates sibling branches.
pub fn build_branch(parent: Hash32, count: usize, salt: u32) -> Vec<BlockHeader> {
    let mut prev = parent;
    (0..count)
        .map(|i| {
            let header = BlockHeader {
                version: block::Version::ONE,
                prev_blockhash: prev.into(),
                merkle_root: Hash32::double_sha256(&(i as u32).to_le_bytes()).into(),
                time: 1_700_000_000 + i as u32,
                bits: CompactTarget::from_consensus(0x207fffff),
                nonce: salt.wrapping_mul(1_000).wrapping_add(i as u32),
            };
            prev = header.id();
            header
        })
        .collect()
}

pub fn secret(seed: u8) -> SecretKey {
    SecretKey::from_slice(&[seed; 32]).unwrap()
}

pub fn xpub(seed: u8) -> ExtendedKey {
    let key = OracleKey::new(secret(seed));
    ExtendedKey::new(Network::Mainnet, [seed; 32], key.public_key())
}

pub fn acme() -> EntityField {
    EntityField {
        name: "Acme Pty Ltd".to_string(),
        entity_type: "C".to_string(),
        country_code: "AUS".to_string(),
        email_address: "ops@acme.example".to_string(),
        administration: vec![AdministratorField {
            role: 1,
            name: "Jane Citizen".to_string(),
        }],
        ..Default::default()
    }
}

pub struct Harness {
    pub oracle: Arc<Oracle>,
    pub tracker: Arc<HeaderTracker>,
    pub feed: Arc<MemoryFeed>,
    pub store: Arc<MemoryIdentityStore>,
    pub contracts: Arc<ContractFormationCache>,
    pub approver: Arc<ScriptedApprover>,
    pub chain: Vec<BlockHeader>,
    pub cancel: CancellationToken,
}

pub struct TestUser {
    pub key: OracleKey,
    pub user_id: Uuid,
    pub xpubs: ExtendedKeys,
    pub entity: EntityField,
}

impl Harness {
    /// Oracle over in-memory collaborators with a full header window.
    pub async fn new() -> Self {
        Self::with_chain(build_chain(10)).await
    }

    pub async fn with_chain(chain: Vec<BlockHeader>) -> Self {
        let cancel = CancellationToken::new();
        let feed = Arc::new(MemoryFeed::new(chain.clone()));
        let tracker = Arc::new(HeaderTracker::new(
            OFFSET,
            Arc::clone(&feed) as Arc<dyn HeaderFeed>,
        ));
        tracker.reinitialize(&cancel).await.unwrap();

        let store = Arc::new(MemoryIdentityStore::new());
        let contracts = Arc::new(ContractFormationCache::new(
            Box::new(MemoryFormationStorage::new()),
            Network::Mainnet,
            true,
        ));
        let approver = Arc::new(ScriptedApprover::default());
        let oracle = Oracle::new(
            store.clone(),
            tracker.clone(),
            contracts.clone(),
            OracleKey::new(secret(0x42)),
            OracleSettings::default(),
        )
        .with_approver(approver.clone());

        Self {
            oracle: Arc::new(oracle),
            tracker,
            feed,
            store,
            contracts,
            approver,
            chain,
            cancel,
        }
    }

    /// The block hash attestations are expected to bind to.
    pub fn sig_block(&self) -> (Hash32, u32) {
        let index = self.chain.len() - OFFSET;
        (self.chain[index].id(), index as u32)
    }

    /// Registers `entity` and attaches a key set of `xpub(seed)..` keys.
    pub async fn register_user(
        &self,
        seed: u8,
        entity: EntityField,
        key_count: u8,
        required: u32,
    ) -> TestUser {
        let key = OracleKey::new(secret(seed));
        let signature = key.sign(&sighash::registration(&entity));
        let user_id = match self
            .oracle
            .register(&self.cancel, &entity, key.public_key(), &signature)
            .await
            .unwrap()
        {
            Decision::Accepted(user_id) => user_id,
            Decision::Rejected { description } => panic!("registration rejected: {description}"),
        };

        let keys = (0..key_count)
            .map(|i| xpub(seed.wrapping_add(100).wrapping_add(i)))
            .collect();
        let xpubs = ExtendedKeys::new(keys).unwrap();
        let signature = key.sign(&sighash::add_key_set(&user_id, &xpubs, required));
        self.oracle
            .add_key_set(&self.cancel, user_id, xpubs.clone(), required, &signature)
            .await
            .unwrap();

        TestUser {
            key,
            user_id,
            xpubs,
            entity,
        }
    }
}
