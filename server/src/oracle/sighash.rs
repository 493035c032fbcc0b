//! Digests the oracle signs. Each is the double SHA-256 of the fields listed
//! on the function, concatenated in that order.

use crate::chain::Hash32;
use crate::keys::{ExtendedKeys, PublicKey, RawAddress};
use crate::models::EntityField;

/// What an admin certificate binds the admin address to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminTarget {
    Entity(EntityField),
    Contract(RawAddress),
}

fn approve_byte(approved: bool) -> u8 {
    u8::from(approved)
}

/// entity ‖ child public key ‖ block hash ‖ approve
pub fn entity_pub_key(
    entity: &EntityField,
    public_key: &PublicKey,
    block_hash: &Hash32,
    approved: bool,
) -> Hash32 {
    let mut buf = entity.canonical_bytes();
    buf.extend_from_slice(&public_key.serialize());
    buf.extend_from_slice(block_hash.as_bytes());
    buf.push(approve_byte(approved));
    Hash32::double_sha256(&buf)
}

/// entity ‖ xpubs ‖ block hash ‖ approve
pub fn entity_xpub(
    entity: &EntityField,
    xpubs: &ExtendedKeys,
    block_hash: &Hash32,
    approved: bool,
) -> Hash32 {
    let mut buf = entity.canonical_bytes();
    buf.extend_from_slice(&xpubs.to_bytes());
    buf.extend_from_slice(block_hash.as_bytes());
    buf.push(approve_byte(approved));
    Hash32::double_sha256(&buf)
}

/// admin address ‖ (0x00 ‖ entity | 0x01 ‖ contract address) ‖ block hash ‖
/// expiration u64 LE ‖ approve
pub fn contract_admin_identity(
    admin_address: &RawAddress,
    target: &AdminTarget,
    block_hash: &Hash32,
    expiration: u64,
    approved: bool,
) -> Hash32 {
    let mut buf = admin_address.to_bytes();
    match target {
        AdminTarget::Entity(entity) => {
            buf.push(0x00);
            buf.extend_from_slice(&entity.canonical_bytes());
        }
        AdminTarget::Contract(address) => {
            buf.push(0x01);
            buf.extend_from_slice(&address.to_bytes());
        }
    }
    buf.extend_from_slice(block_hash.as_bytes());
    buf.extend_from_slice(&expiration.to_le_bytes());
    buf.push(approve_byte(approved));
    Hash32::double_sha256(&buf)
}

/// contract address ‖ instrument code ‖ receive address ‖ block hash ‖
/// expiration u64 LE ‖ approve
pub fn transfer(
    contract: &RawAddress,
    instrument_code: &[u8; 20],
    receive_address: &RawAddress,
    block_hash: &Hash32,
    expiration: u64,
    approved: bool,
) -> Hash32 {
    let mut buf = contract.to_bytes();
    buf.extend_from_slice(instrument_code);
    buf.extend_from_slice(&receive_address.to_bytes());
    buf.extend_from_slice(block_hash.as_bytes());
    buf.extend_from_slice(&expiration.to_le_bytes());
    buf.push(approve_byte(approved));
    Hash32::double_sha256(&buf)
}

/// Registration proof: entity
pub fn registration(entity: &EntityField) -> Hash32 {
    Hash32::double_sha256(&entity.canonical_bytes())
}

/// Key-set proof: user id ‖ xpubs ‖ required signers u32 LE
pub fn add_key_set(user_id: &uuid::Uuid, xpubs: &ExtendedKeys, required_signers: u32) -> Hash32 {
    let mut buf = user_id.as_bytes().to_vec();
    buf.extend_from_slice(&xpubs.to_bytes());
    buf.extend_from_slice(&required_signers.to_le_bytes());
    Hash32::double_sha256(&buf)
}

/// Identity-update proof: user id ‖ entity
pub fn update_identity(user_id: &uuid::Uuid, entity: &EntityField) -> Hash32 {
    let mut buf = user_id.as_bytes().to_vec();
    buf.extend_from_slice(&entity.canonical_bytes());
    Hash32::double_sha256(&buf)
}
