use serde::{Deserialize, Serialize};

use tradeflow_core::Lifecycle;

/// Purchase order status lifecycle.
///
/// There is deliberately no "partially received" state: partial receipt is
/// tracked per line through [`LineStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseOrderStatus {
    Draft,
    Pending,
    Approved,
    Ordered,
    Shipped,
    Received,
    Cancelled,
}

tradeflow_core::status_names!(PurchaseOrderStatus {
    Draft => "draft",
    Pending => "pending",
    Approved => "approved",
    Ordered => "ordered",
    Shipped => "shipped",
    Received => "received",
    Cancelled => "cancelled",
});

impl Lifecycle for PurchaseOrderStatus {
    const KIND: &'static str = "purchase order";
    const TRANSITIONS: &'static [(Self, Self)] = &[
        (PurchaseOrderStatus::Draft, PurchaseOrderStatus::Pending),
        (PurchaseOrderStatus::Pending, PurchaseOrderStatus::Approved),
        (PurchaseOrderStatus::Approved, PurchaseOrderStatus::Ordered),
        (PurchaseOrderStatus::Ordered, PurchaseOrderStatus::Shipped),
        (PurchaseOrderStatus::Shipped, PurchaseOrderStatus::Received),
        (PurchaseOrderStatus::Draft, PurchaseOrderStatus::Cancelled),
        (PurchaseOrderStatus::Pending, PurchaseOrderStatus::Cancelled),
        (PurchaseOrderStatus::Approved, PurchaseOrderStatus::Cancelled),
        (PurchaseOrderStatus::Ordered, PurchaseOrderStatus::Cancelled),
    ];

    fn initial() -> Self {
        PurchaseOrderStatus::Draft
    }
}

impl PurchaseOrderStatus {
    /// Goods can be booked in once the order has been placed with the supplier.
    pub fn accepts_receipts(self) -> bool {
        matches!(self, PurchaseOrderStatus::Ordered | PurchaseOrderStatus::Shipped)
    }
}

/// Receipt progress of one PO line, derived from received vs ordered quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStatus {
    Pending,
    Partial,
    Complete,
}

tradeflow_core::status_names!(LineStatus {
    Pending => "pending",
    Partial => "partial",
    Complete => "complete",
});

impl LineStatus {
    pub fn derive(received: i64, ordered: i64) -> Self {
        if received <= 0 {
            LineStatus::Pending
        } else if received < ordered {
            LineStatus::Partial
        } else {
            LineStatus::Complete
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_states_before_shipped_can_cancel() {
        use PurchaseOrderStatus::*;
        for s in [Draft, Pending, Approved, Ordered] {
            assert!(s.can_transition_to(Cancelled), "{s} should cancel");
        }
        for s in [Shipped, Received] {
            assert!(!s.can_transition_to(Cancelled), "{s} should not cancel");
        }
        assert!(Received.is_terminal());
    }

    #[test]
    fn line_status_follows_received_quantity() {
        assert_eq!(LineStatus::derive(0, 5), LineStatus::Pending);
        assert_eq!(LineStatus::derive(3, 5), LineStatus::Partial);
        assert_eq!(LineStatus::derive(5, 5), LineStatus::Complete);
    }
}
