//! Legal entity descriptions attached to registered users and contract
//! issuers.

use bitcoin::consensus::encode::{serialize, VarInt};
use serde::{Deserialize, Serialize};

/// A legal entity's identifying details. Empty strings mean "not specified".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityField {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub lei: String,
    pub unit_number: String,
    pub building_number: String,
    pub street: String,
    pub suburb_city: String,
    pub territory_state_province_code: String,
    pub country_code: String,
    pub postal_zip_code: String,
    pub email_address: String,
    pub phone_number: String,
    pub administration: Vec<AdministratorField>,
    pub management: Vec<ManagerField>,
    pub domain_name: String,
    pub paymail_handle: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdministratorField {
    #[serde(rename = "type", default)]
    pub role: u32,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerField {
    #[serde(rename = "type", default)]
    pub role: u32,
    #[serde(default)]
    pub name: String,
}

impl EntityField {
    /// Deterministic byte encoding fed into signature hashes: every string as
    /// a varint-prefixed UTF-8 field in declaration order, with each role list
    /// written as a count followed by `(role u32 LE, name)` pairs.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for value in [
            &self.name,
            &self.entity_type,
            &self.lei,
            &self.unit_number,
            &self.building_number,
            &self.street,
            &self.suburb_city,
            &self.territory_state_province_code,
            &self.country_code,
            &self.postal_zip_code,
            &self.email_address,
            &self.phone_number,
        ] {
            buf.extend(serialize(value));
        }

        buf.extend(serialize(&VarInt(self.administration.len() as u64)));
        for admin in &self.administration {
            buf.extend(serialize(&admin.role));
            buf.extend(serialize(&admin.name));
        }

        buf.extend(serialize(&VarInt(self.management.len() as u64)));
        for manager in &self.management {
            buf.extend(serialize(&manager.role));
            buf.extend(serialize(&manager.name));
        }

        buf.extend(serialize(&self.domain_name));
        buf.extend(serialize(&self.paymail_handle));
        buf
    }
}
