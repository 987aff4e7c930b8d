//! Sales orders domain module.
//!
//! Business rules for orders: line totals, adjustments, the fulfilment and
//! payment lifecycles. Pure domain logic; reservations and persistence are
//! driven from `tradeflow-infra`.

pub mod order;
pub mod status;

pub use order::{
    Adjustments, ItemStatus, Order, OrderItem, OrderOwner, OrderRecord, PlaceOrder, PricedLine,
    ShippingInfo,
};
pub use status::{OrderStatus, PaymentStatus};
