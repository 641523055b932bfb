//! Product and category performance, rankings and seasonal breakdowns.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use pos_core::config::ProductConfig;
use pos_core::error::{InsightError, InsightResult};
use pos_core::types::{CategorizedTransaction, Category, DateRange};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregator::{group_by, ratio, within, Totals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProductSortKey {
    Revenue,
    Quantity,
    Transactions,
    AvgPrice,
}

impl FromStr for ProductSortKey {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "revenue" => Ok(Self::Revenue),
            "quantity" => Ok(Self::Quantity),
            "transactions" => Ok(Self::Transactions),
            "avgPrice" | "avg_price" => Ok(Self::AvgPrice),
            other => Err(InsightError::InvalidSortField(other.to_string())),
        }
    }
}

/// Lookup form of a product name: trimmed, ASCII case folded.
pub fn product_key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSummary {
    pub name: String,
    pub category: Category,
    pub revenue: f64,
    pub units_sold: u64,
    pub transaction_count: usize,
    pub avg_unit_price: f64,
}

impl ProductSummary {
    fn sort_value(&self, key: ProductSortKey) -> f64 {
        match key {
            ProductSortKey::Revenue => self.revenue,
            ProductSortKey::Quantity => self.units_sold as f64,
            ProductSortKey::Transactions => self.transaction_count as f64,
            ProductSortKey::AvgPrice => self.avg_unit_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub category: Category,
    pub revenue: f64,
    pub units_sold: u64,
    pub transaction_count: usize,
    pub product_count: usize,
    pub percent_of_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPerformance {
    pub range: DateRange,
    pub sort_by: ProductSortKey,
    pub total_revenue: f64,
    pub product_count: usize,
    pub top_products: Vec<ProductSummary>,
    pub bottom_products: Vec<ProductSummary>,
    pub category_performance: Vec<CategorySummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonalProduct {
    pub name: String,
    pub category: Category,
    /// January..December; months without sales are zero.
    pub monthly_revenue: [f64; 12],
    pub monthly_units: [u64; 12],
    pub total_revenue: f64,
    pub peak_month: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonalBreakdown {
    pub year: i32,
    pub products: Vec<SeasonalProduct>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDay {
    pub date: NaiveDate,
    pub revenue: f64,
    pub units_sold: u64,
    pub transactions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductTrend {
    pub name: String,
    pub category: Category,
    pub range: DateRange,
    pub total_revenue: f64,
    pub total_units: u64,
    pub daily: Vec<ProductDay>,
}

pub struct ProductAnalyzer {
    config: ProductConfig,
}

impl ProductAnalyzer {
    pub fn new(config: &ProductConfig) -> Self {
        info!(
            default_limit = config.default_limit,
            max_limit = config.max_limit,
            "Product analyzer initialized"
        );
        Self {
            config: config.clone(),
        }
    }

    /// Resolves the requested limit against configured bounds.
    pub fn resolve_limit(&self, limit: Option<usize>) -> InsightResult<usize> {
        let limit = limit.unwrap_or(self.config.default_limit);
        if limit == 0 || limit > self.config.max_limit {
            return Err(InsightError::InvalidParameter {
                name: "limit",
                reason: format!("must be between 1 and {}", self.config.max_limit),
            });
        }
        Ok(limit)
    }

    /// Per-product summaries in first-seen order.
    pub fn summarize(
        &self,
        transactions: &[CategorizedTransaction],
        range: &DateRange,
    ) -> Vec<ProductSummary> {
        group_by(within(transactions, range), |tx| tx.product_name.as_str())
            .into_iter()
            .map(|(name, group)| {
                let category = group[0].category;
                let totals = Totals::of(group);
                ProductSummary {
                    name: name.to_string(),
                    category,
                    revenue: totals.revenue,
                    units_sold: totals.units,
                    transaction_count: totals.transactions,
                    avg_unit_price: ratio(totals.revenue, totals.units as f64),
                }
            })
            .collect()
    }

    /// Categories without sales in range are omitted. Order is by revenue,
    /// highest first, ties in first-seen order.
    pub fn categories(products: &[ProductSummary]) -> Vec<CategorySummary> {
        let total: f64 = products.iter().map(|p| p.revenue).sum();
        let mut categories: Vec<CategorySummary> = group_by(products, |p| p.category)
            .into_iter()
            .map(|(category, group)| CategorySummary {
                category,
                revenue: group.iter().map(|p| p.revenue).sum(),
                units_sold: group.iter().map(|p| p.units_sold).sum(),
                transaction_count: group.iter().map(|p| p.transaction_count).sum(),
                product_count: group.len(),
                percent_of_total: 0.0,
            })
            .collect();
        for category in &mut categories {
            category.percent_of_total = ratio(category.revenue, total) * 100.0;
        }
        categories.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));
        categories
    }

    pub fn performance(
        &self,
        transactions: &[CategorizedTransaction],
        range: &DateRange,
        sort_by: ProductSortKey,
        limit: Option<usize>,
    ) -> InsightResult<ProductPerformance> {
        let limit = self.resolve_limit(limit)?;
        let products = self.summarize(transactions, range);
        let category_performance = Self::categories(&products);

        let mut ranked: Vec<&ProductSummary> = products.iter().collect();
        ranked.sort_by(|a, b| descending(a.sort_value(sort_by), b.sort_value(sort_by)));
        let top_products: Vec<ProductSummary> =
            ranked.iter().take(limit).map(|p| (*p).clone()).collect();

        ranked.sort_by(|a, b| a.sort_value(sort_by).total_cmp(&b.sort_value(sort_by)));
        let bottom_products: Vec<ProductSummary> =
            ranked.iter().take(limit).map(|p| (*p).clone()).collect();

        debug!(
            range = %range,
            products = products.len(),
            categories = category_performance.len(),
            sort_by = ?sort_by,
            "Product performance computed"
        );

        Ok(ProductPerformance {
            range: *range,
            sort_by,
            total_revenue: products.iter().map(|p| p.revenue).sum(),
            product_count: products.len(),
            top_products,
            bottom_products,
            category_performance,
        })
    }

    pub fn seasonal(
        &self,
        transactions: &[CategorizedTransaction],
        year: i32,
    ) -> InsightResult<SeasonalBreakdown> {
        let range = DateRange::year(year)?;
        let mut products: Vec<SeasonalProduct> =
            group_by(within(transactions, &range), |tx| tx.product_name.as_str())
                .into_iter()
                .map(|(name, group)| {
                    let mut monthly_revenue = [0.0; 12];
                    let mut monthly_units = [0u64; 12];
                    for tx in &group {
                        let slot = tx.date().month0() as usize;
                        monthly_revenue[slot] += tx.amount;
                        monthly_units[slot] += u64::from(tx.quantity);
                    }
                    let peak_month = monthly_revenue
                        .iter()
                        .enumerate()
                        .filter(|(_, revenue)| **revenue > 0.0)
                        .fold(None::<(usize, f64)>, |best, (i, revenue)| match best {
                            Some((_, b)) if b >= *revenue => best,
                            _ => Some((i, *revenue)),
                        })
                        .map(|(i, _)| i as u32 + 1);
                    SeasonalProduct {
                        name: name.to_string(),
                        category: group[0].category,
                        total_revenue: monthly_revenue.iter().sum(),
                        monthly_revenue,
                        monthly_units,
                        peak_month,
                    }
                })
                .collect();
        products.sort_by(|a, b| b.total_revenue.total_cmp(&a.total_revenue));
        Ok(SeasonalBreakdown { year, products })
    }

    /// Daily series for one product. Names match by [`product_key`].
    pub fn trend(
        &self,
        transactions: &[CategorizedTransaction],
        product: &str,
        range: &DateRange,
    ) -> InsightResult<ProductTrend> {
        let wanted = product.trim();
        if wanted.is_empty() {
            return Err(InsightError::MissingRequiredParameter("product"));
        }
        let key = product_key(wanted);
        let rows: Vec<&CategorizedTransaction> = within(transactions, range)
            .filter(|tx| product_key(&tx.product_name) == key)
            .collect();
        let Some(first) = rows.first() else {
            return Err(InsightError::ResourceNotFound {
                kind: "product",
                id: wanted.to_string(),
            });
        };

        let mut daily: Vec<ProductDay> = group_by(rows.iter().copied(), |tx| tx.date())
            .into_iter()
            .map(|(date, group)| {
                let totals = Totals::of(group);
                ProductDay {
                    date,
                    revenue: totals.revenue,
                    units_sold: totals.units,
                    transactions: totals.transactions,
                }
            })
            .collect();
        daily.sort_by_key(|d| d.date);

        Ok(ProductTrend {
            name: first.product_name.clone(),
            category: first.category,
            range: *range,
            total_revenue: daily.iter().map(|d| d.revenue).sum(),
            total_units: daily.iter().map(|d| d.units_sold).sum(),
            daily,
        })
    }
}

fn descending(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures::{cash, date, units};

    fn analyzer() -> ProductAnalyzer {
        ProductAnalyzer::new(&ProductConfig::default())
    }

    fn march() -> DateRange {
        DateRange::new(date(2024, 3, 1), date(2024, 3, 31)).unwrap()
    }

    fn sample() -> Vec<CategorizedTransaction> {
        vec![
            units(cash(date(2024, 3, 1), 8, 9.0, "Latte"), 2),
            cash(date(2024, 3, 1), 9, 3.0, "Espresso"),
            cash(date(2024, 3, 2), 9, 4.5, "Cappuccino"),
            cash(date(2024, 3, 2), 10, 3.0, "Espresso"),
            cash(date(2024, 3, 3), 11, 6.0, "Croissant"),
        ]
    }

    #[test]
    fn test_invalid_sort_key_is_rejected() {
        let err = "price".parse::<ProductSortKey>().unwrap_err();
        assert_eq!(err.code(), "INVALID_SORT_FIELD");
        assert_eq!("avgPrice".parse::<ProductSortKey>().unwrap(), ProductSortKey::AvgPrice);
    }

    #[test]
    fn test_top_and_bottom_by_revenue() {
        let perf = analyzer()
            .performance(&sample(), &march(), ProductSortKey::Revenue, Some(2))
            .unwrap();
        assert_eq!(perf.product_count, 4);
        let top: Vec<&str> = perf.top_products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(top, vec!["Latte", "Espresso"]);
        // Espresso ties Croissant at 6.0 but was seen first.
        let bottom: Vec<&str> = perf.bottom_products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(bottom, vec!["Cappuccino", "Espresso"]);
        assert!((perf.top_products[0].avg_unit_price - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_category_totals_match_products() {
        let perf = analyzer()
            .performance(&sample(), &march(), ProductSortKey::Quantity, None)
            .unwrap();
        let category_sum: f64 = perf.category_performance.iter().map(|c| c.revenue).sum();
        assert!((category_sum - perf.total_revenue).abs() < 0.01);

        let latte = &perf.category_performance[0];
        assert_eq!(latte.category, Category::Latte);
        assert_eq!(latte.product_count, 2);
        assert!((latte.percent_of_total - 13.5 / 25.5 * 100.0).abs() < 1e-9);
        assert!(perf
            .category_performance
            .iter()
            .all(|c| c.category != Category::Tea));
        let percent_sum: f64 = perf.category_performance.iter().map(|c| c.percent_of_total).sum();
        assert!((percent_sum - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_limit_bounds() {
        let analyzer = analyzer();
        assert!(analyzer.resolve_limit(Some(0)).is_err());
        assert!(analyzer.resolve_limit(Some(101)).is_err());
        assert_eq!(analyzer.resolve_limit(None).unwrap(), 10);
    }

    #[test]
    fn test_seasonal_always_twelve_months() {
        let mut rows = sample();
        rows.push(cash(date(2024, 11, 20), 9, 12.0, "Espresso"));
        let seasonal = analyzer().seasonal(&rows, 2024).unwrap();
        let espresso = seasonal.products.iter().find(|p| p.name == "Espresso").unwrap();
        assert_eq!(espresso.monthly_revenue.len(), 12);
        assert_eq!(espresso.monthly_revenue[0], 0.0);
        assert!((espresso.monthly_revenue[2] - 6.0).abs() < 1e-9);
        assert_eq!(espresso.peak_month, Some(11));
        assert_eq!(seasonal.products[0].name, "Espresso");
    }

    #[test]
    fn test_product_trend_lookup() {
        let analyzer = analyzer();
        let trend = analyzer.trend(&sample(), "espresso", &march()).unwrap();
        assert_eq!(trend.name, "Espresso");
        assert_eq!(trend.daily.len(), 2);
        assert_eq!(trend.total_units, 2);

        let missing = analyzer.trend(&sample(), "  ", &march()).unwrap_err();
        assert_eq!(missing.code(), "MISSING_REQUIRED_PARAMETER");
        let absent = analyzer.trend(&sample(), "Matcha", &march()).unwrap_err();
        assert_eq!(absent.code(), "RESOURCE_NOT_FOUND");
    }
}
