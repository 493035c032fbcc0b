//! Key material: secp256k1 public keys, the oracle's signing key, BIP-32
//! extended public keys and the raw/base58 address forms derived from them.
//! Curve operations, derivation and base58check come from rust-bitcoin.

mod address;
mod extended;
mod public;

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{self, All, Secp256k1};
use bitcoin::{base58, bip32, NetworkKind};

pub use address::{InstrumentId, RawAddress};
pub use extended::{ExtendedKey, ExtendedKeys, HARDENED_OFFSET};
pub use public::{verify_signature, OracleKey, PublicKey};

/// Errors raised while parsing or deriving key material.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid base58: {0}")]
    Base58(#[from] base58::Error),

    #[error("invalid key: {0}")]
    Secp256k1(#[from] secp256k1::Error),

    #[error("invalid extended key: {0}")]
    Bip32(#[from] bip32::Error),

    /// Encoded value has the wrong length for its type.
    #[error("invalid {what} length {len}")]
    InvalidLength { what: &'static str, len: usize },

    #[error("private extended keys are not accepted")]
    PrivateKey,

    #[error("cannot derive hardened child {0} from a public key")]
    HardenedDerivation(u32),

    #[error("empty key set")]
    EmptyKeySet,

    #[error("required signers {required} must be between 1 and {available}")]
    RequiredSigners { required: u32, available: usize },

    #[error("unknown address type {0:#04x}")]
    UnknownAddressType(u8),

    #[error("invalid instrument id: {0}")]
    InvalidInstrument(String),

    #[error("unknown network {0}")]
    UnknownNetwork(String),
}

/// The bitcoin network keys and addresses are encoded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub(crate) fn pkh_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet => 0x6f,
        }
    }

    pub(crate) fn sh_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x05,
            Network::Testnet => 0xc4,
        }
    }

    pub(crate) fn kind(self) -> NetworkKind {
        match self {
            Network::Mainnet => NetworkKind::Main,
            Network::Testnet => NetworkKind::Test,
        }
    }

    pub(crate) fn xprv_version(self) -> [u8; 4] {
        match self {
            Network::Mainnet => [0x04, 0x88, 0xad, 0xe4],
            Network::Testnet => [0x04, 0x35, 0x83, 0x94],
        }
    }
}

impl From<NetworkKind> for Network {
    fn from(kind: NetworkKind) -> Self {
        match kind {
            NetworkKind::Main => Network::Mainnet,
            NetworkKind::Test => Network::Testnet,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Testnet => f.write_str("testnet"),
        }
    }
}

impl FromStr for Network {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" | "regtest" | "stn" => Ok(Network::Testnet),
            other => Err(KeyError::UnknownNetwork(other.to_string())),
        }
    }
}

/// RIPEMD-160 of SHA-256.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    bitcoin::hashes::hash160::Hash::hash(data).to_byte_array()
}

pub(crate) fn secp() -> &'static Secp256k1<All> {
    static CONTEXT: OnceLock<Secp256k1<All>> = OnceLock::new();
    CONTEXT.get_or_init(Secp256k1::new)
}
