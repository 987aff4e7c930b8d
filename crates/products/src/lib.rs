//! Product catalogue entries as seen by the order workflow.
//!
//! Products are the pricing source for direct orders. Catalogue maintenance
//! itself lives elsewhere; this crate only carries the rules the workflow
//! depends on (pricing validity, sellability).

pub mod product;

pub use product::{CreateProduct, Pricing, Product};
