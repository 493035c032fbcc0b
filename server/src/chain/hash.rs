use std::fmt;
use std::str::FromStr;

use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{BlockHash, TxMerkleNode, Txid};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ChainError;

/// A 32-byte double-SHA-256 digest.
///
/// Stored in internal (wire) byte order. The string form is the reversed hex
/// that block explorers and node RPCs show.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash32([u8; 32]);

impl Hash32 {
    pub const SIZE: usize = 32;

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ChainError> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ChainError::InvalidHashLength(bytes.len()))?;
        Ok(Self(array))
    }

    pub fn double_sha256(data: &[u8]) -> Self {
        Self(sha256d::Hash::hash(data).to_byte_array())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl From<BlockHash> for Hash32 {
    fn from(hash: BlockHash) -> Self {
        Self(hash.to_byte_array())
    }
}

impl From<Txid> for Hash32 {
    fn from(txid: Txid) -> Self {
        Self(txid.to_byte_array())
    }
}

impl From<Hash32> for BlockHash {
    fn from(hash: Hash32) -> Self {
        BlockHash::from_byte_array(hash.0)
    }
}

impl From<Hash32> for Txid {
    fn from(hash: Hash32) -> Self {
        Txid::from_byte_array(hash.0)
    }
}

impl From<Hash32> for TxMerkleNode {
    fn from(hash: Hash32) -> Self {
        TxMerkleNode::from_byte_array(hash.0)
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&sha256d::Hash::from_byte_array(self.0), f)
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({self})")
    }
}

impl FromStr for Hash32 {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = hex::decode(s)?;
        bytes.reverse();
        Self::from_slice(&bytes)
    }
}

impl Serialize for Hash32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_reversed_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        let hash = Hash32::new(bytes);
        let shown = hash.to_string();
        assert!(shown.ends_with("ab"));
        assert_eq!(shown.parse::<Hash32>().unwrap(), hash);
        assert_eq!(shown, BlockHash::from(hash).to_string());
    }

    #[test]
    fn rejects_short_input() {
        assert!(matches!(
            "abcd".parse::<Hash32>(),
            Err(ChainError::InvalidHashLength(2))
        ));
    }
}
