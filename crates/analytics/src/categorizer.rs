//! Keyword categorizer: maps free-text product names onto a fixed category set.

use std::sync::Arc;

use dashmap::DashMap;
use pos_core::types::{CategorizedTransaction, Category, Transaction};
use tracing::debug;

/// Ordered keyword rules. The first rule with a matching keyword wins, so
/// "Chai Latte" resolves to `Latte` and "Irish Coffee" to `Specialty`.
/// Keywords are lowercase and matched as substrings of the lowercased name.
pub const CATEGORY_RULES: &[(Category, &[&str])] = &[
    (Category::Espresso, &["espresso"]),
    (Category::Latte, &["latte", "cappuccino", "flat white", "mocha"]),
    (Category::Americano, &["americano"]),
    (Category::HotChocolate, &["chocolate", "cocoa"]),
    (Category::Tea, &["tea", "chai"]),
    (Category::Specialty, &["whiskey", "irish"]),
];

/// Pure rule evaluation without memoization.
pub fn categorize(product_name: &str) -> Category {
    let name = product_name.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| name.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Other)
}

/// Memoizing categorizer shared across analysis passes.
pub struct Categorizer {
    memo: DashMap<String, Category>,
}

impl Categorizer {
    pub fn new() -> Self {
        Self {
            memo: DashMap::new(),
        }
    }

    pub fn categorize(&self, product_name: &str) -> Category {
        if let Some(hit) = self.memo.get(product_name) {
            return *hit;
        }
        let category = categorize(product_name);
        self.memo.insert(product_name.to_string(), category);
        category
    }

    /// Decorate every row once. The result is read-only and can be shared
    /// between analyzers running concurrently.
    pub fn categorize_all(&self, transactions: Vec<Transaction>) -> Arc<[CategorizedTransaction]> {
        let decorated: Vec<CategorizedTransaction> = transactions
            .into_iter()
            .map(|transaction| {
                let category = self.categorize(&transaction.product_name);
                CategorizedTransaction {
                    transaction,
                    category,
                }
            })
            .collect();
        debug!(
            rows = decorated.len(),
            distinct_names = self.memo.len(),
            "Categorized analysis pass"
        );
        decorated.into()
    }

    pub fn memoized_names(&self) -> usize {
        self.memo.len()
    }
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::new()
    }
}
