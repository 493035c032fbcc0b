use crate::models::{AdministratorField, EntityField, ManagerField};

/// The first field of a claimed entity that the registered entity does not
/// back up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntityMismatch {
    #[error("{0} doesn't match")]
    Field(&'static str),

    /// Index into the claimed administration list.
    #[error("Administrator {0}")]
    Administrator(usize),

    /// Index into the claimed management list.
    #[error("Manager {0}")]
    Manager(usize),
}

/// Succeeds when every non-empty field of `sub` equals the same field of
/// `full`, and every administrator and manager in `sub` appears in `full`
/// with the same role and name.
pub fn verify_entity_is_subset(sub: &EntityField, full: &EntityField) -> Result<(), EntityMismatch> {
    let leading = [
        ("Name", &sub.name, &full.name),
        ("Type", &sub.entity_type, &full.entity_type),
        ("LEI", &sub.lei, &full.lei),
        ("UnitNumber", &sub.unit_number, &full.unit_number),
        ("BuildingNumber", &sub.building_number, &full.building_number),
        ("Street", &sub.street, &full.street),
        ("SuburbCity", &sub.suburb_city, &full.suburb_city),
        (
            "TerritoryStateProvinceCode",
            &sub.territory_state_province_code,
            &full.territory_state_province_code,
        ),
        ("CountryCode", &sub.country_code, &full.country_code),
        ("PostalZIPCode", &sub.postal_zip_code, &full.postal_zip_code),
        ("EmailAddress", &sub.email_address, &full.email_address),
        ("PhoneNumber", &sub.phone_number, &full.phone_number),
    ];
    check_fields(&leading)?;

    for (i, admin) in sub.administration.iter().enumerate() {
        if !administrator_in_list(admin, &full.administration) {
            return Err(EntityMismatch::Administrator(i));
        }
    }

    for (i, manager) in sub.management.iter().enumerate() {
        if !manager_in_list(manager, &full.management) {
            return Err(EntityMismatch::Manager(i));
        }
    }

    check_fields(&[
        ("DomainName", &sub.domain_name, &full.domain_name),
        ("PaymailHandle", &sub.paymail_handle, &full.paymail_handle),
    ])
}

fn check_fields(fields: &[(&'static str, &String, &String)]) -> Result<(), EntityMismatch> {
    match fields
        .iter()
        .find(|(_, sub, full)| !sub.is_empty() && sub != full)
    {
        Some((label, _, _)) => Err(EntityMismatch::Field(*label)),
        None => Ok(()),
    }
}

fn administrator_in_list(admin: &AdministratorField, list: &[AdministratorField]) -> bool {
    list.iter()
        .any(|item| item.role == admin.role && item.name == admin.name)
}

fn manager_in_list(manager: &ManagerField, list: &[ManagerField]) -> bool {
    list.iter()
        .any(|item| item.role == manager.role && item.name == manager.name)
}
