//! Point-of-sale insight engine: revenue, product, traffic, customer and
//! inventory analytics derived from an immutable transaction set.
//!
//! Every analyzer is a pure function of `(transactions, range, parameters)`;
//! [`InsightEngine`] wires them to a [`pos_core::TransactionSource`].

#![warn(clippy::unwrap_used)]

pub mod aggregator;
pub mod categorizer;
pub mod customer;
pub mod engine;
pub mod inventory;
pub mod product;
pub mod revenue;
pub mod traffic;

pub use categorizer::Categorizer;
pub use customer::CustomerAnalyzer;
pub use engine::{AnalysisPass, InsightEngine, Snapshot};
pub use inventory::InventoryAnalyzer;
pub use product::ProductAnalyzer;
pub use revenue::RevenueAnalyzer;
pub use traffic::TrafficAnalyzer;
