//! Contracts domain module.
//!
//! Long-running supply agreements with a recurring basket, the calendar that
//! decides when the basket turns into an order, and the log of every firing.

pub mod contract;
pub mod log;
pub mod schedule;
pub mod status;

pub use contract::{
    Contract, ContractItem, ContractLine, ContractRecord, CreateContract, TermOutcome,
};
pub use log::{ContractOrder, ContractOrderStatus};
pub use schedule::{ContractSchedule, Frequency, Recurrence, days_in_month, parse_time_of_day};
pub use status::ContractStatus;
