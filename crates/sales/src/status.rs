use serde::{Deserialize, Serialize};

use tradeflow_core::Lifecycle;

/// Fulfilment lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

tradeflow_core::status_names!(OrderStatus {
    Pending => "pending",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
    Returned => "returned",
});

impl Lifecycle for OrderStatus {
    const KIND: &'static str = "order";
    const TRANSITIONS: &'static [(Self, Self)] = &[
        (OrderStatus::Pending, OrderStatus::Processing),
        (OrderStatus::Processing, OrderStatus::Shipped),
        (OrderStatus::Shipped, OrderStatus::Delivered),
        (OrderStatus::Pending, OrderStatus::Cancelled),
        (OrderStatus::Processing, OrderStatus::Cancelled),
        (OrderStatus::Shipped, OrderStatus::Returned),
        (OrderStatus::Delivered, OrderStatus::Returned),
    ];

    fn initial() -> Self {
        OrderStatus::Pending
    }
}

/// Payment lifecycle, orthogonal to [`OrderStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

tradeflow_core::status_names!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
});

impl Lifecycle for PaymentStatus {
    const KIND: &'static str = "payment";
    const TRANSITIONS: &'static [(Self, Self)] = &[
        (PaymentStatus::Pending, PaymentStatus::Paid),
        (PaymentStatus::Pending, PaymentStatus::Failed),
        (PaymentStatus::Paid, PaymentStatus::Refunded),
    ];

    fn initial() -> Self {
        PaymentStatus::Pending
    }
}
