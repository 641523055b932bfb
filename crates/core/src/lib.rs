//! Shared domain types for the point-of-sale insight engine: transactions,
//! categories, date ranges, the error taxonomy, configuration and the
//! transaction source seam.

pub mod config;
pub mod error;
pub mod source;
pub mod types;

pub use config::AppConfig;
pub use error::{InsightError, InsightResult};
pub use source::{InMemoryTransactionStore, TransactionSource};
pub use types::{
    CategorizedTransaction, Category, CustomerToken, DateRange, PaymentMethod, Transaction,
};
