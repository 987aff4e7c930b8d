//! `tradeflow-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use entity::{Entity, find_by_id, find_by_id_mut};
pub use error::{DomainError, DomainResult};
pub use id::{
    AddressId, CompanyId, ContractId, ContractItemId, ContractOrderId, InventoryItemId, OrderId,
    OrderItemId, PoItemId, ProductId, PurchaseOrderId, ScheduleId, SupplierId, UserId,
    WarehouseId, document_number, short_code,
};
pub use lifecycle::{Lifecycle, Tracked, TransitionOutcome, transition};
pub use value_object::{Money, ValueObject};

/// Implements `Display`, `as_str` and `FromStr` for a unit-variant status enum
/// from a single `Variant => "wire_name"` table.
#[macro_export]
macro_rules! status_names {
    ($t:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $t {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($t::$variant => $name,)+
                }
            }
        }

        impl ::core::fmt::Display for $t {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::str::FromStr for $t {
            type Err = $crate::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($t::$variant),)+
                    other => Err($crate::DomainError::validation(format!(
                        "unknown {}: {other}",
                        stringify!($t)
                    ))),
                }
            }
        }
    };
}
