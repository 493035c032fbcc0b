//! Contract-formation actions carried in `OP_RETURN` outputs.
//!
//! An action output is `[OP_FALSE] OP_RETURN <protocol id> <action code>
//! <payload>`, where the protocol id is `TKN` on production chains and
//! `test.TKN` on test chains, and the payload of a `C2` action is the JSON
//! encoding of [`ContractFormation`].

use bitcoin::script::{PushBytesError, Script, ScriptBuf};
use serde::{Deserialize, Serialize};

use super::entity::EntityField;
use crate::chain::script;

pub const PROTOCOL_ID: &[u8] = b"TKN";
pub const TEST_PROTOCOL_ID: &[u8] = b"test.TKN";
pub const CONTRACT_FORMATION_CODE: &[u8] = b"C2";

pub fn protocol_id(is_test: bool) -> &'static [u8] {
    if is_test {
        TEST_PROTOCOL_ID
    } else {
        PROTOCOL_ID
    }
}

/// Published terms of a contract, including the issuing entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractFormation {
    pub contract_name: String,
    pub contract_type: String,
    pub issuer: Option<EntityField>,
    pub contract_revision: u32,
    /// Nanoseconds since the unix epoch.
    pub timestamp: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum FormationError {
    #[error("not an action output")]
    NotAction,

    #[error("wrong protocol id")]
    WrongProtocol,

    #[error("action {0} is not a contract formation")]
    OtherAction(String),

    #[error("invalid contract formation payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("contract formation too large: {0}")]
    TooLarge(#[from] PushBytesError),
}

impl ContractFormation {
    /// Builds the locking script of an action output carrying this formation.
    pub fn to_script(&self, is_test: bool) -> Result<ScriptBuf, FormationError> {
        let payload = serde_json::to_vec(self)?;
        Ok(script::op_return(&[
            protocol_id(is_test),
            CONTRACT_FORMATION_CODE,
            &payload[..],
        ])?)
    }

    /// Parses a locking script as a contract-formation action.
    pub fn from_script(locking_script: &Script, is_test: bool) -> Result<Self, FormationError> {
        let pushes = script::op_return_pushes(locking_script).ok_or(FormationError::NotAction)?;
        let [protocol, code, payload] = pushes.as_slice() else {
            return Err(FormationError::NotAction);
        };

        if *protocol != protocol_id(is_test) {
            return Err(FormationError::WrongProtocol);
        }
        if *code != CONTRACT_FORMATION_CODE {
            return Err(FormationError::OtherAction(
                String::from_utf8_lossy(code).into_owned(),
            ));
        }

        Ok(serde_json::from_slice(payload)?)
    }
}
