use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_core::{ContractId, ContractOrderId, OrderId, ScheduleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractOrderStatus {
    Processed,
    Failed,
}

tradeflow_core::status_names!(ContractOrderStatus {
    Processed => "processed",
    Failed => "failed",
});

/// Append-only record of one schedule firing.
///
/// A failed firing has no order and carries the error that stopped it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractOrder {
    pub id: ContractOrderId,
    pub contract_id: ContractId,
    pub schedule_id: ScheduleId,
    pub generated_date: DateTime<Utc>,
    pub status: ContractOrderStatus,
    pub order_id: Option<OrderId>,
    pub error: Option<String>,
}

impl ContractOrder {
    pub fn processed(
        contract_id: ContractId,
        schedule_id: ScheduleId,
        order_id: OrderId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ContractOrderId::new(),
            contract_id,
            schedule_id,
            generated_date: at,
            status: ContractOrderStatus::Processed,
            order_id: Some(order_id),
            error: None,
        }
    }

    pub fn failed(
        contract_id: ContractId,
        schedule_id: ScheduleId,
        error: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ContractOrderId::new(),
            contract_id,
            schedule_id,
            generated_date: at,
            status: ContractOrderStatus::Failed,
            order_id: None,
            error: Some(error.into()),
        }
    }
}
