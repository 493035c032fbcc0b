use std::fmt;
use std::str::FromStr;

use bitcoin::secp256k1::{self, ecdsa::Signature, Message, SecretKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{hash160, secp, KeyError};
use crate::chain::Hash32;

/// A compressed secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(secp256k1::PublicKey);

impl PublicKey {
    pub const SIZE: usize = 33;

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        Ok(Self(secp256k1::PublicKey::from_slice(bytes)?))
    }

    pub fn serialize(&self) -> [u8; 33] {
        self.0.serialize()
    }

    pub fn hash160(&self) -> [u8; 20] {
        hash160(&self.serialize())
    }

    pub(crate) fn inner(&self) -> &secp256k1::PublicKey {
        &self.0
    }

    pub(crate) fn into_inner(self) -> secp256k1::PublicKey {
        self.0
    }
}

impl From<secp256k1::PublicKey> for PublicKey {
    fn from(key: secp256k1::PublicKey) -> Self {
        Self(key)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.serialize()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

impl FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&hex::decode(s.trim())?)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The oracle's private signing key.
#[derive(Clone)]
pub struct OracleKey {
    secret: SecretKey,
    public: PublicKey,
}

impl OracleKey {
    pub fn new(secret: SecretKey) -> Self {
        let public = PublicKey(secp256k1::PublicKey::from_secret_key(secp(), &secret));
        Self { secret, public }
    }

    /// Parses a 32-byte key given as 64 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim())?;
        if bytes.len() != 32 {
            return Err(KeyError::InvalidLength {
                what: "oracle key",
                len: bytes.len(),
            });
        }
        Ok(Self::new(SecretKey::from_slice(&bytes)?))
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// DER-encoded ECDSA signature over a precomputed digest.
    pub fn sign(&self, digest: &Hash32) -> Vec<u8> {
        let message = Message::from_digest(*digest.as_bytes());
        secp()
            .sign_ecdsa(&message, &self.secret)
            .serialize_der()
            .to_vec()
    }
}

impl fmt::Debug for OracleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleKey")
            .field("public", &self.public)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Checks a DER-encoded ECDSA signature over a precomputed digest. High-S
/// signatures are normalized before verification.
pub fn verify_signature(digest: &Hash32, signature_der: &[u8], key: &PublicKey) -> bool {
    let Ok(mut signature) = Signature::from_der(signature_der) else {
        return false;
    };
    signature.normalize_s();
    let message = Message::from_digest(*digest.as_bytes());
    secp()
        .verify_ecdsa(&message, &signature, key.inner())
        .is_ok()
}
