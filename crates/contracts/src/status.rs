use serde::{Deserialize, Serialize};

use tradeflow_core::Lifecycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Draft,
    Active,
    Paused,
    Expired,
    Cancelled,
}

tradeflow_core::status_names!(ContractStatus {
    Draft => "draft",
    Active => "active",
    Paused => "paused",
    Expired => "expired",
    Cancelled => "cancelled",
});

impl Lifecycle for ContractStatus {
    const KIND: &'static str = "contract";
    const TRANSITIONS: &'static [(Self, Self)] = &[
        (ContractStatus::Draft, ContractStatus::Active),
        (ContractStatus::Active, ContractStatus::Paused),
        (ContractStatus::Paused, ContractStatus::Active),
        (ContractStatus::Active, ContractStatus::Expired),
        (ContractStatus::Draft, ContractStatus::Cancelled),
        (ContractStatus::Active, ContractStatus::Cancelled),
        (ContractStatus::Paused, ContractStatus::Cancelled),
    ];

    fn initial() -> Self {
        ContractStatus::Draft
    }
}
