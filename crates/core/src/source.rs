//! Transaction source seam. The engine only ever reads through this trait;
//! storage and import live outside of it.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::error::InsightResult;
use crate::types::{DateRange, Transaction};

pub trait TransactionSource: Send + Sync {
    /// Transactions with `occurred_at` inside `range` (inclusive), ordered by
    /// `occurred_at`.
    fn transactions_between(&self, range: &DateRange) -> InsightResult<Vec<Transaction>>;

    /// Full history up to and including `end`, ordered by `occurred_at`.
    fn transactions_through(&self, end: NaiveDate) -> InsightResult<Vec<Transaction>>;
}

/// Immutable, pre-sorted in-memory store.
#[derive(Debug, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<[Transaction]>,
}

impl InMemoryTransactionStore {
    /// Builds a store after checking every record's invariants. Sorting is
    /// stable, so records sharing a timestamp keep their input order.
    pub fn new(mut transactions: Vec<Transaction>) -> InsightResult<Self> {
        for tx in &transactions {
            tx.validate()?;
        }
        transactions.sort_by_key(|tx| tx.occurred_at);
        debug!(count = transactions.len(), "Transaction store built");
        Ok(Self {
            transactions: transactions.into(),
        })
    }

    /// Reads a JSON array of transaction records.
    pub fn from_json_file(path: impl AsRef<Path>) -> InsightResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let transactions: Vec<Transaction> = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            count = transactions.len(),
            "Loaded transactions"
        );
        Self::new(transactions)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl TransactionSource for InMemoryTransactionStore {
    fn transactions_between(&self, range: &DateRange) -> InsightResult<Vec<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .filter(|tx| range.contains(tx.date()))
            .cloned()
            .collect())
    }

    fn transactions_through(&self, end: NaiveDate) -> InsightResult<Vec<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .take_while(|tx| tx.date() <= end)
            .cloned()
            .collect())
    }
}
