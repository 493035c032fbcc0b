use std::fmt;
use std::str::FromStr;

use bitcoin::base58;

use super::{KeyError, Network, PublicKey};

const TYPE_PKH: u8 = 0x20;
const TYPE_SH: u8 = 0x21;
const TYPE_MULTI_PKH: u8 = 0x22;

/// A locking condition in its raw byte form: a type byte followed by the
/// hashes it commits to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RawAddress {
    PublicKeyHash([u8; 20]),
    ScriptHash([u8; 20]),
    MultiPublicKeyHash { required: u16, hashes: Vec<[u8; 20]> },
}

impl RawAddress {
    pub fn from_public_key(key: &PublicKey) -> Self {
        RawAddress::PublicKeyHash(key.hash160())
    }

    /// A single key yields a P2PKH address, several keys a multi-PKH address
    /// that needs `required` of them.
    pub fn from_keys(keys: &[PublicKey], required: u32) -> Result<Self, KeyError> {
        if keys.is_empty() {
            return Err(KeyError::EmptyKeySet);
        }
        if required == 0 || required as usize > keys.len() {
            return Err(KeyError::RequiredSigners {
                required,
                available: keys.len(),
            });
        }

        if let [key] = keys {
            return Ok(Self::from_public_key(key));
        }

        if keys.len() > usize::from(u16::MAX) {
            return Err(KeyError::InvalidLength {
                what: "multi-pkh key list",
                len: keys.len(),
            });
        }

        Ok(RawAddress::MultiPublicKeyHash {
            required: required as u16,
            hashes: keys.iter().map(PublicKey::hash160).collect(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            RawAddress::PublicKeyHash(hash) => [&[TYPE_PKH][..], &hash[..]].concat(),
            RawAddress::ScriptHash(hash) => [&[TYPE_SH][..], &hash[..]].concat(),
            RawAddress::MultiPublicKeyHash { required, hashes } => {
                let mut out = Vec::with_capacity(5 + hashes.len() * 20);
                out.push(TYPE_MULTI_PKH);
                out.extend_from_slice(&required.to_le_bytes());
                out.extend_from_slice(&(hashes.len() as u16).to_le_bytes());
                for hash in hashes {
                    out.extend_from_slice(hash);
                }
                out
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let invalid = || KeyError::InvalidLength {
            what: "raw address",
            len: bytes.len(),
        };
        let hash = |body: &[u8]| <[u8; 20]>::try_from(body).map_err(|_| invalid());

        let (&kind, body) = bytes.split_first().ok_or_else(invalid)?;
        match kind {
            TYPE_PKH => Ok(RawAddress::PublicKeyHash(hash(body)?)),
            TYPE_SH => Ok(RawAddress::ScriptHash(hash(body)?)),
            TYPE_MULTI_PKH => {
                let [r0, r1, c0, c1, hashes @ ..] = body else {
                    return Err(invalid());
                };
                let count = usize::from(u16::from_le_bytes([*c0, *c1]));
                if hashes.len() != count * 20 {
                    return Err(invalid());
                }
                Ok(RawAddress::MultiPublicKeyHash {
                    required: u16::from_le_bytes([*r0, *r1]),
                    hashes: hashes
                        .chunks_exact(20)
                        .map(hash)
                        .collect::<Result<_, _>>()?,
                })
            }
            other => Err(KeyError::UnknownAddressType(other)),
        }
    }

    /// Base58check form for single-hash addresses. Multi-PKH has no base58
    /// encoding and is rendered as hex of the raw bytes.
    pub fn encode(&self, network: Network) -> String {
        let (version, hash) = match self {
            RawAddress::PublicKeyHash(hash) => (network.pkh_version(), hash),
            RawAddress::ScriptHash(hash) => (network.sh_version(), hash),
            RawAddress::MultiPublicKeyHash { .. } => return hex::encode(self.to_bytes()),
        };
        let payload = [&[version][..], &hash[..]].concat();
        base58::encode_check(&payload)
    }

    /// Accepts either a base58check address for `network` or hex raw bytes.
    pub fn decode(s: &str, network: Network) -> Result<Self, KeyError> {
        let s = s.trim();
        if let Ok(payload) = base58::decode_check(s) {
            if payload.len() != 21 {
                return Err(KeyError::InvalidLength {
                    what: "address",
                    len: payload.len(),
                });
            }
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&payload[1..]);
            return match payload[0] {
                v if v == network.pkh_version() => Ok(RawAddress::PublicKeyHash(hash)),
                v if v == network.sh_version() => Ok(RawAddress::ScriptHash(hash)),
                other => Err(KeyError::UnknownAddressType(other)),
            };
        }
        Self::from_bytes(&hex::decode(s)?)
    }
}

/// A tokenized instrument: a three letter type code followed by the base58check
/// encoding of its 20-byte instrument code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstrumentId {
    pub instrument_type: String,
    pub code: [u8; 20],
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.instrument_type,
            base58::encode_check(&self.code)
        )
    }
}

impl FromStr for InstrumentId {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || KeyError::InvalidInstrument(s.to_string());

        if s.len() <= 3 || !s.is_char_boundary(3) {
            return Err(invalid());
        }
        let (instrument_type, encoded) = s.split_at(3);
        if !instrument_type.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(invalid());
        }

        let payload = base58::decode_check(encoded).map_err(|_| invalid())?;
        let code: [u8; 20] = payload.as_slice().try_into().map_err(|_| invalid())?;

        Ok(Self {
            instrument_type: instrument_type.to_string(),
            code,
        })
    }
}
