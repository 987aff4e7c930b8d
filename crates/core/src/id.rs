//! Strongly-typed identifiers used across the domain.
//!
//! Every cross-aggregate reference is one of these ids, resolved through a
//! store lookup; aggregates never hold live references to each other.

use chrono::{DateTime, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! uuid_ids {
    ($($(#[$meta:meta])* $t:ident => $name:literal),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $t(Uuid);

            impl $t {
                /// Create a new identifier.
                ///
                /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
                /// for determinism.
                pub fn new() -> Self {
                    Self(Uuid::now_v7())
                }

                pub fn from_uuid(uuid: Uuid) -> Self {
                    Self(uuid)
                }

                pub fn as_uuid(&self) -> &Uuid {
                    &self.0
                }
            }

            impl Default for $t {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl core::fmt::Display for $t {
                fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                    core::fmt::Display::fmt(&self.0, f)
                }
            }

            impl From<Uuid> for $t {
                fn from(value: Uuid) -> Self {
                    Self(value)
                }
            }

            impl From<$t> for Uuid {
                fn from(value: $t) -> Self {
                    value.0
                }
            }

            impl FromStr for $t {
                type Err = DomainError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    let uuid = Uuid::from_str(s)
                        .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                    Ok(Self(uuid))
                }
            }
        )+
    };
}

uuid_ids! {
    /// Acting user (resolved by the identity collaborator).
    UserId => "UserId",
    /// Buying or contracting company.
    CompanyId => "CompanyId",
    /// Shipping address (owned by the address book, out of scope here).
    AddressId => "AddressId",
    SupplierId => "SupplierId",
    WarehouseId => "WarehouseId",
    ProductId => "ProductId",
    InventoryItemId => "InventoryItemId",
    OrderId => "OrderId",
    OrderItemId => "OrderItemId",
    PurchaseOrderId => "PurchaseOrderId",
    PoItemId => "PoItemId",
    ContractId => "ContractId",
    ContractItemId => "ContractItemId",
    ScheduleId => "ScheduleId",
    ContractOrderId => "ContractOrderId",
}

/// Short, human-facing suffix for generated document numbers.
///
/// Takes the random tail of a UUIDv7 so numbers minted in the same
/// millisecond still differ.
pub fn short_code(uuid: &Uuid) -> String {
    let simple = uuid.simple().to_string();
    simple[simple.len() - 8..].to_uppercase()
}

/// Caller-supplied document number, or a generated `PREFIX-YYYYMMDD-XXXXXXXX`.
pub fn document_number(
    supplied: Option<String>,
    prefix: &str,
    at: DateTime<Utc>,
    uuid: &Uuid,
) -> Result<String, DomainError> {
    match supplied {
        Some(number) => {
            let number = number.trim();
            if number.is_empty() {
                return Err(DomainError::validation(format!(
                    "{prefix} number cannot be blank"
                )));
            }
            Ok(number.to_string())
        }
        None => Ok(format!("{prefix}-{}-{}", at.format("%Y%m%d"), short_code(uuid))),
    }
}
