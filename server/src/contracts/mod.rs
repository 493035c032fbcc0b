//! Contract-formation cache.
//!
//! Keeps the newest contract formation seen for each contract address so
//! admin certificates can be checked against the issuer a contract published.
//! Records are stored as the raw action script and re-parsed on read.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use bitcoin::Script;
use tracing::{debug, error, info, warn};

use crate::chain::{script, txid, Transaction};
use crate::error::{with_cancel, OracleError, Result};
use crate::keys::{Network, PublicKey, RawAddress};
use crate::models::formation::FormationError;
use crate::models::ContractFormation;

/// Byte storage for formation scripts, keyed by raw contract address.
#[async_trait]
pub trait FormationStorage: Send + Sync {
    async fn read(&self, address: &[u8]) -> Result<Option<Vec<u8>>>;
    async fn write(&self, address: &[u8], script: &[u8]) -> Result<()>;
}

/// Read side of the cache, as the attestation engine sees it.
#[async_trait]
pub trait FormationSource: Send + Sync {
    async fn contract_formation(
        &self,
        cancel: &CancellationToken,
        address: &RawAddress,
    ) -> Result<ContractFormation>;
}

#[derive(Debug, Default)]
pub struct MemoryFormationStorage {
    scripts: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryFormationStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FormationStorage for MemoryFormationStorage {
    async fn read(&self, address: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.scripts.read().await.get(address).cloned())
    }

    async fn write(&self, address: &[u8], script: &[u8]) -> Result<()> {
        self.scripts
            .write()
            .await
            .insert(address.to_vec(), script.to_vec());
        Ok(())
    }
}

pub struct PgFormationStorage {
    db_pool: PgPool,
}

impl PgFormationStorage {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl FormationStorage for PgFormationStorage {
    async fn read(&self, address: &[u8]) -> Result<Option<Vec<u8>>> {
        let script = sqlx::query_scalar::<_, Vec<u8>>(
            "SELECT script FROM contract_formations WHERE address = $1",
        )
        .bind(address)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(script)
    }

    async fn write(&self, address: &[u8], script: &[u8]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contract_formations (address, script, date_modified)
            VALUES ($1, $2, $3)
            ON CONFLICT (address)
            DO UPDATE SET script = EXCLUDED.script, date_modified = EXCLUDED.date_modified
            "#,
        )
        .bind(address)
        .bind(script)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }
}

pub struct ContractFormationCache {
    storage: Box<dyn FormationStorage>,
    network: Network,
    is_test: bool,
    // Held across each read-check-write.
    write_lock: Mutex<()>,
}

impl ContractFormationCache {
    pub fn new(storage: Box<dyn FormationStorage>, network: Network, is_test: bool) -> Self {
        Self {
            storage,
            network,
            is_test,
            write_lock: Mutex::new(()),
        }
    }

    /// Stores every contract formation among `tx`'s outputs under the
    /// address that signed its first input. Returns how many were stored.
    /// An output that cannot be stored is logged and the rest are still
    /// scanned; only cancellation ends the scan early.
    pub async fn observe(&self, cancel: &CancellationToken, tx: &Transaction) -> Result<usize> {
        if tx.output.is_empty() {
            return Ok(0);
        }
        let Some(address) = first_input_address(tx) else {
            return Ok(0);
        };

        let mut saved = 0;
        for (vout, output) in tx.output.iter().enumerate() {
            let parsed = ContractFormation::from_script(&output.script_pubkey, self.is_test);
            let formation = match parsed {
                Ok(formation) => formation,
                Err(FormationError::Payload(err)) => {
                    warn!(error = %err, txid = %txid(tx), vout, "unreadable contract formation");
                    continue;
                }
                Err(_) => continue,
            };

            match self
                .save(cancel, &address, &formation, output.script_pubkey.as_bytes())
                .await
            {
                Ok(true) => saved += 1,
                Ok(false) => {}
                Err(err @ OracleError::Canceled { .. }) => return Err(err),
                Err(err) if err.is_transient() => {
                    warn!(error = %err, txid = %txid(tx), vout, "contract formation not saved")
                }
                Err(err) => {
                    error!(error = %err, txid = %txid(tx), vout, "failed to save contract formation")
                }
            }
        }

        Ok(saved)
    }

    /// Writes `formation` unless the stored record is strictly newer. Returns
    /// whether the script was written.
    pub async fn save(
        &self,
        cancel: &CancellationToken,
        address: &RawAddress,
        formation: &ContractFormation,
        script: &[u8],
    ) -> Result<bool> {
        let key = address.to_bytes();
        let shown = address.encode(self.network);
        let _guard = self.write_lock.lock().await;

        let existing = with_cancel(cancel, "read contract formation", self.storage.read(&key)).await?;

        match existing {
            None => info!(address = %shown, "saving contract formation"),
            Some(bytes) => match ContractFormation::from_script(
                Script::from_bytes(&bytes),
                self.is_test,
            ) {
                Err(err) => {
                    warn!(address = %shown, error = %err, "overwriting invalid contract formation");
                }
                Ok(current) if current.timestamp > formation.timestamp => {
                    debug!(
                        address = %shown,
                        current = current.timestamp,
                        observed = formation.timestamp,
                        "keeping newer contract formation"
                    );
                    return Ok(false);
                }
                Ok(_) => info!(address = %shown, "updating contract formation"),
            },
        }

        with_cancel(
            cancel,
            "write contract formation",
            self.storage.write(&key, script),
        )
        .await?;
        Ok(true)
    }

    pub async fn get(
        &self,
        cancel: &CancellationToken,
        address: &RawAddress,
    ) -> Result<ContractFormation> {
        let key = address.to_bytes();
        let bytes = with_cancel(cancel, "read contract formation", self.storage.read(&key))
            .await?
            .ok_or_else(|| OracleError::not_found("contract formation", address.encode(self.network)))?;

        ContractFormation::from_script(Script::from_bytes(&bytes), self.is_test).map_err(|err| {
            OracleError::Malformed {
                what: "contract formation",
                reason: err.to_string(),
            }
        })
    }
}

#[async_trait]
impl FormationSource for ContractFormationCache {
    async fn contract_formation(
        &self,
        cancel: &CancellationToken,
        address: &RawAddress,
    ) -> Result<ContractFormation> {
        self.get(cancel, address).await
    }
}

/// Address of the key that signed the first input, read from a standard
/// `<signature> <public key>` unlocking script.
pub fn first_input_address(tx: &Transaction) -> Option<RawAddress> {
    let input = tx.input.first()?;

    let key_bytes = if input.script_sig.is_empty() {
        // Segwit v0 key-hash spend carries the same pair in the witness.
        if input.witness.len() != 2 {
            return None;
        }
        input.witness.last()?
    } else {
        match script::pushes(&input.script_sig)?.as_slice() {
            [_, key] => *key,
            _ => return None,
        }
    };

    PublicKey::from_slice(key_bytes)
        .ok()
        .map(|key| RawAddress::from_public_key(&key))
}
