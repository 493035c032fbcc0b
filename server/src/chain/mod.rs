//! Chain data the oracle follows. Consensus decoding of headers, blocks and
//! transactions comes from rust-bitcoin; this module adds the oracle's
//! 32-byte hash form and the script helpers for action outputs.

mod hash;
pub mod script;

use bitcoin::consensus::{deserialize, encode};

pub use bitcoin::block::Header as BlockHeader;
pub use bitcoin::{Block, Transaction, TxIn, TxOut};
pub use hash::Hash32;

/// Errors raised while decoding chain data.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("invalid consensus encoding: {0}")]
    Decode(#[from] encode::Error),

    #[error("invalid hash length {0}, expected 32")]
    InvalidHashLength(usize),

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Decodes an 80-byte header, as returned by `getblockheader <hash> false`.
pub fn decode_header(bytes: &[u8]) -> Result<BlockHeader, ChainError> {
    Ok(deserialize(bytes)?)
}

/// Decodes a full block, as returned by `getblock <hash> 0`.
pub fn decode_block(bytes: &[u8]) -> Result<Block, ChainError> {
    Ok(deserialize(bytes)?)
}

/// Header hashes in [`Hash32`] form.
pub trait HeaderIds {
    fn id(&self) -> Hash32;
    fn parent_id(&self) -> Hash32;
}

impl HeaderIds for BlockHeader {
    fn id(&self) -> Hash32 {
        self.block_hash().into()
    }

    fn parent_id(&self) -> Hash32 {
        self.prev_blockhash.into()
    }
}

pub fn txid(tx: &Transaction) -> Hash32 {
    tx.compute_txid().into()
}
