use std::fmt;
use std::str::FromStr;

use bitcoin::base58;
use bitcoin::bip32::{ChainCode, ChildNumber, Fingerprint, Xpub};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{secp, KeyError, Network, PublicKey};

pub const HARDENED_OFFSET: u32 = 0x8000_0000;
const SERIALIZED_SIZE: usize = 78;
const MAX_KEYS: usize = u8::MAX as usize;

/// A BIP-32 extended public key.
#[derive(Clone, PartialEq, Eq)]
pub struct ExtendedKey(Xpub);

impl ExtendedKey {
    /// A depth-zero key with no parent.
    pub fn new(network: Network, chain_code: [u8; 32], public_key: PublicKey) -> Self {
        Self(Xpub {
            network: network.kind(),
            depth: 0,
            parent_fingerprint: Fingerprint::from([0; 4]),
            child_number: ChildNumber::Normal { index: 0 },
            public_key: public_key.into_inner(),
            chain_code: ChainCode::from(chain_code),
        })
    }

    pub fn network(&self) -> Network {
        self.0.network.into()
    }

    pub fn public_key(&self) -> PublicKey {
        self.0.public_key.into()
    }

    pub fn depth(&self) -> u8 {
        self.0.depth
    }

    /// Public child derivation. Hardened indexes need the private key and are
    /// refused.
    pub fn child_key(&self, index: u32) -> Result<ExtendedKey, KeyError> {
        if index >= HARDENED_OFFSET {
            return Err(KeyError::HardenedDerivation(index));
        }
        let child = self.0.ckd_pub(secp(), ChildNumber::Normal { index })?;
        Ok(Self(child))
    }

    pub fn to_bytes(&self) -> [u8; SERIALIZED_SIZE] {
        self.0.encode()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != SERIALIZED_SIZE {
            return Err(KeyError::InvalidLength {
                what: "extended key",
                len: bytes.len(),
            });
        }
        let version = &bytes[..4];
        if [Network::Mainnet, Network::Testnet]
            .iter()
            .any(|network| network.xprv_version() == version)
        {
            return Err(KeyError::PrivateKey);
        }
        Ok(Self(Xpub::decode(bytes)?))
    }
}

impl fmt::Display for ExtendedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtendedKey({self})")
    }
}

impl FromStr for ExtendedKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(&base58::decode_check(s.trim())?)
    }
}

/// An ordered, non-empty set of extended public keys that together control a
/// multi-signature key set.
#[derive(Clone, PartialEq, Eq)]
pub struct ExtendedKeys(Vec<ExtendedKey>);

impl ExtendedKeys {
    pub fn new(keys: Vec<ExtendedKey>) -> Result<Self, KeyError> {
        if keys.is_empty() {
            return Err(KeyError::EmptyKeySet);
        }
        if keys.len() > MAX_KEYS {
            return Err(KeyError::InvalidLength {
                what: "key set",
                len: keys.len(),
            });
        }
        Ok(Self(keys))
    }

    pub fn single(key: ExtendedKey) -> Self {
        Self(vec![key])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtendedKey> {
        self.0.iter()
    }

    /// Derives the public child at `index` from every key in the set.
    pub fn child_keys(&self, index: u32) -> Result<Vec<PublicKey>, KeyError> {
        self.0
            .iter()
            .map(|key| key.child_key(index).map(|child| child.public_key()))
            .collect()
    }

    /// Count byte followed by each 78-byte key.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.0.len() * SERIALIZED_SIZE);
        out.push(self.0.len() as u8);
        for key in &self.0 {
            out.extend_from_slice(&key.to_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let invalid = || KeyError::InvalidLength {
            what: "key set",
            len: bytes.len(),
        };

        let (&count, body) = bytes.split_first().ok_or_else(invalid)?;
        if body.len() != usize::from(count) * SERIALIZED_SIZE {
            return Err(invalid());
        }
        let keys = body
            .chunks_exact(SERIALIZED_SIZE)
            .map(ExtendedKey::from_bytes)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(keys)
    }
}

impl fmt::Display for ExtendedKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ExtendedKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl FromStr for ExtendedKeys {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let keys = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(ExtendedKey::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(keys)
    }
}

impl Serialize for ExtendedKeys {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ExtendedKeys {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
