//! Insight engine: validates request parameters, fetches one analysis pass
//! from the transaction source, decorates it with categories and hands the
//! read-only rows to the analyzers.

use std::sync::Arc;

use pos_core::config::AppConfig;
use pos_core::error::{InsightError, InsightResult};
use pos_core::source::TransactionSource;
use pos_core::types::{CategorizedTransaction, DateRange};
use serde::Serialize;
use tracing::{info, warn};

use crate::categorizer::Categorizer;
use crate::customer::{
    CohortReport, CustomerAnalyzer, CustomerInsights, CustomerProfile, RetentionReport,
};
use crate::inventory::{ForecastOptions, InventoryAnalyzer, InventoryReport};
use crate::product::{
    ProductAnalyzer, ProductPerformance, ProductSortKey, ProductTrend, SeasonalBreakdown,
};
use crate::revenue::{
    GrowthRate, PeriodComparison, RevenueAnalyzer, RevenueMetrics, RevenueTrends, TrendPeriod,
    YearlyRevenue,
};
use crate::traffic::{
    CapacityReport, DailyTraffic, HourlyTraffic, StaffingRecommendation, TrafficAnalyzer,
    WeeklyPatterns,
};

/// Categorized rows for one request. `rows` covers the range; `history`
/// covers everything up to the range end.
#[derive(Clone)]
pub struct AnalysisPass {
    pub range: DateRange,
    pub rows: Arc<[CategorizedTransaction]>,
    pub history: Arc<[CategorizedTransaction]>,
}

/// All five metric families for one range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub revenue: RevenueMetrics,
    pub products: ProductPerformance,
    pub hourly: HourlyTraffic,
    pub daily: DailyTraffic,
    pub customers: CustomerInsights,
    pub inventory: InventoryReport,
}

pub struct InsightEngine {
    source: Arc<dyn TransactionSource>,
    categorizer: Categorizer,
    revenue: RevenueAnalyzer,
    products: ProductAnalyzer,
    traffic: TrafficAnalyzer,
    customers: CustomerAnalyzer,
    inventory: InventoryAnalyzer,
}

impl InsightEngine {
    pub fn new(source: Arc<dyn TransactionSource>, config: &AppConfig) -> Self {
        info!("Insight engine initialized");
        Self {
            source,
            categorizer: Categorizer::new(),
            revenue: RevenueAnalyzer::new(),
            products: ProductAnalyzer::new(&config.products),
            traffic: TrafficAnalyzer::new(&config.traffic),
            customers: CustomerAnalyzer::new(),
            inventory: InventoryAnalyzer::new(&config.inventory),
        }
    }

    pub fn revenue(&self) -> &RevenueAnalyzer {
        &self.revenue
    }

    pub fn products(&self) -> &ProductAnalyzer {
        &self.products
    }

    pub fn traffic(&self) -> &TrafficAnalyzer {
        &self.traffic
    }

    pub fn customers(&self) -> &CustomerAnalyzer {
        &self.customers
    }

    pub fn inventory(&self) -> &InventoryAnalyzer {
        &self.inventory
    }

    /// Fetch and categorize `range` once.
    pub fn fetch(&self, range: &DateRange) -> InsightResult<Arc<[CategorizedTransaction]>> {
        let rows = self.source.transactions_between(range)?;
        Ok(self.categorizer.categorize_all(rows))
    }

    /// Fetch and categorize all history up to `range.end`.
    pub fn fetch_history(&self, range: &DateRange) -> InsightResult<Arc<[CategorizedTransaction]>> {
        let rows = self.source.transactions_through(range.end)?;
        Ok(self.categorizer.categorize_all(rows))
    }

    /// History and range rows for one request, sharing a single fetch.
    pub fn prepare(&self, range: &DateRange) -> InsightResult<AnalysisPass> {
        let history = self.fetch_history(range)?;
        let rows: Vec<CategorizedTransaction> = history
            .iter()
            .filter(|tx| range.contains(tx.date()))
            .cloned()
            .collect();
        Ok(AnalysisPass {
            range: *range,
            rows: rows.into(),
            history,
        })
    }

    // ─── Revenue ────────────────────────────────────────────────────────

    pub fn revenue_metrics(&self, range: &DateRange) -> InsightResult<RevenueMetrics> {
        record("revenue");
        let rows = self.fetch(range)?;
        Ok(self.revenue.metrics(&rows, range))
    }

    pub fn growth_rate(&self, range: &DateRange) -> InsightResult<GrowthRate> {
        record("growth");
        let previous_range = range.preceding().ok_or_else(|| {
            rejected(InsightError::InvalidParameter {
                name: "startDate",
                reason: "no representable preceding period".to_string(),
            })
        })?;
        let current = self.fetch(range)?;
        let previous = self.fetch(&previous_range)?;
        Ok(self
            .revenue
            .growth_rate(range, &current, &previous_range, &previous))
    }

    /// Both periods are required; changes are reported from B to A.
    pub fn compare(
        &self,
        period_a: Option<DateRange>,
        period_b: Option<DateRange>,
    ) -> InsightResult<PeriodComparison> {
        record("compare");
        let range_a = period_a
            .ok_or_else(|| rejected(InsightError::MissingRequiredParameter("periodA")))?;
        let range_b = period_b
            .ok_or_else(|| rejected(InsightError::MissingRequiredParameter("periodB")))?;
        let rows_a = self.fetch(&range_a)?;
        let rows_b = self.fetch(&range_b)?;
        Ok(self.revenue.compare(&range_a, &rows_a, &range_b, &rows_b))
    }

    pub fn revenue_trends(
        &self,
        range: &DateRange,
        period: &str,
        limit: usize,
    ) -> InsightResult<RevenueTrends> {
        record("trends");
        let period: TrendPeriod = period.parse().map_err(rejected)?;
        if limit == 0 {
            return Err(rejected(InsightError::InvalidParameter {
                name: "limit",
                reason: "must be at least 1".to_string(),
            }));
        }
        let rows = self.fetch(range)?;
        self.revenue.trends(&rows, range, period, limit)
    }

    pub fn yearly_revenue(&self, year: i32) -> InsightResult<YearlyRevenue> {
        record("yearly");
        let range = DateRange::year(year).map_err(rejected)?;
        let rows = self.fetch(&range)?;
        self.revenue.yearly(&rows, year)
    }

    // ─── Products ───────────────────────────────────────────────────────

    pub fn product_performance(
        &self,
        range: &DateRange,
        sort_by: &str,
        limit: Option<usize>,
    ) -> InsightResult<ProductPerformance> {
        record("products");
        let sort_by: ProductSortKey = sort_by.parse().map_err(rejected)?;
        let limit = self.products.resolve_limit(limit).map_err(rejected)?;
        let rows = self.fetch(range)?;
        self.products.performance(&rows, range, sort_by, Some(limit))
    }

    pub fn product_trend(
        &self,
        product: Option<&str>,
        range: &DateRange,
    ) -> InsightResult<ProductTrend> {
        record("product_trend");
        let product = product
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| rejected(InsightError::MissingRequiredParameter("product")))?;
        let rows = self.fetch(range)?;
        self.products.trend(&rows, product, range)
    }

    pub fn seasonal(&self, year: i32) -> InsightResult<SeasonalBreakdown> {
        record("seasonal");
        let range = DateRange::year(year).map_err(rejected)?;
        let rows = self.fetch(&range)?;
        self.products.seasonal(&rows, year)
    }

    // ─── Traffic ────────────────────────────────────────────────────────

    pub fn hourly(
        &self,
        range: &DateRange,
        day_of_week: Option<u8>,
    ) -> InsightResult<HourlyTraffic> {
        record("hourly");
        check_weekday(day_of_week)?;
        let rows = self.fetch(range)?;
        self.traffic.hourly(&rows, range, day_of_week)
    }

    pub fn daily_traffic(&self, range: &DateRange) -> InsightResult<DailyTraffic> {
        record("daily");
        let rows = self.fetch(range)?;
        Ok(self.traffic.daily(&rows, range))
    }

    pub fn weekly_patterns(&self, range: &DateRange) -> InsightResult<WeeklyPatterns> {
        record("weekly");
        let rows = self.fetch(range)?;
        Ok(self.traffic.weekly_patterns(&rows, range))
    }

    pub fn staffing(
        &self,
        range: &DateRange,
        day_of_week: u8,
    ) -> InsightResult<StaffingRecommendation> {
        record("staffing");
        check_weekday(Some(day_of_week))?;
        let rows = self.fetch(range)?;
        self.traffic.staffing_recommendation(&rows, range, day_of_week)
    }

    pub fn capacity(
        &self,
        range: &DateRange,
        max_capacity: Option<u32>,
    ) -> InsightResult<CapacityReport> {
        record("capacity");
        let max_capacity = max_capacity.unwrap_or_else(|| self.traffic.default_max_capacity());
        if max_capacity == 0 {
            return Err(rejected(InsightError::InvalidParameter {
                name: "maxCapacity",
                reason: "must be greater than zero".to_string(),
            }));
        }
        let rows = self.fetch(range)?;
        self.traffic.capacity(&rows, range, max_capacity)
    }

    // ─── Customers ──────────────────────────────────────────────────────

    pub fn customer_insights(&self, range: &DateRange) -> InsightResult<CustomerInsights> {
        record("customers");
        let history = self.fetch_history(range)?;
        Ok(self.customers.insights(&history, range))
    }

    pub fn customer_profiles(&self, range: &DateRange) -> InsightResult<Vec<CustomerProfile>> {
        record("customer_profiles");
        let history = self.fetch_history(range)?;
        Ok(self.customers.profiles(&history, range))
    }

    pub fn customer(
        &self,
        token: Option<&str>,
        range: &DateRange,
    ) -> InsightResult<CustomerProfile> {
        record("customer");
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| rejected(InsightError::MissingRequiredParameter("customer")))?;
        let history = self.fetch_history(range)?;
        self.customers.customer(&history, range, token)
    }

    pub fn retention(&self, range: &DateRange) -> InsightResult<RetentionReport> {
        record("retention");
        let history = self.fetch_history(range)?;
        Ok(self.customers.retention(&history, range))
    }

    pub fn cohorts(&self, range: &DateRange) -> InsightResult<CohortReport> {
        record("cohorts");
        let history = self.fetch_history(range)?;
        Ok(self.customers.cohorts(&history, range))
    }

    // ─── Inventory ──────────────────────────────────────────────────────

    pub fn inventory_report(
        &self,
        range: &DateRange,
        options: ForecastOptions,
    ) -> InsightResult<InventoryReport> {
        record("inventory");
        self.inventory.validate(&options).map_err(rejected)?;
        let rows = self.fetch(range)?;
        self.inventory.recommend(&rows, range, options)
    }

    // ─── Snapshot ───────────────────────────────────────────────────────

    /// Runs every metric family over one shared analysis pass.
    pub fn snapshot(&self, range: &DateRange) -> InsightResult<Snapshot> {
        record("snapshot");
        let pass = self.prepare(range)?;
        self.snapshot_of(&pass)
    }

    pub fn snapshot_of(&self, pass: &AnalysisPass) -> InsightResult<Snapshot> {
        let range = &pass.range;
        let snapshot = Snapshot {
            revenue: self.revenue.metrics(&pass.rows, range),
            products: self
                .products
                .performance(&pass.rows, range, ProductSortKey::Revenue, None)?,
            hourly: self.traffic.hourly(&pass.rows, range, None)?,
            daily: self.traffic.daily(&pass.rows, range),
            customers: self.customers.insights(&pass.history, range),
            inventory: self
                .inventory
                .recommend(&pass.rows, range, ForecastOptions::default())?,
        };
        info!(
            range = %range,
            transactions = snapshot.revenue.transaction_count,
            revenue = snapshot.revenue.total_revenue,
            "Snapshot computed"
        );
        Ok(snapshot)
    }
}

fn record(analyzer: &'static str) {
    metrics::counter!("insights.requests", "analyzer" => analyzer).increment(1);
}

fn rejected(err: InsightError) -> InsightError {
    if err.is_validation() {
        metrics::counter!("insights.validation_errors").increment(1);
        warn!(code = err.code(), error = %err, "Request rejected");
    }
    err
}

fn check_weekday(day_of_week: Option<u8>) -> InsightResult<()> {
    match day_of_week {
        Some(day) if day > 6 => Err(rejected(InsightError::InvalidParameter {
            name: "dayOfWeek",
            reason: format!("{day} is outside 0 (Sunday) ..= 6 (Saturday)"),
        })),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::NaiveDate;
    use pos_core::types::{PaymentMethod, Transaction};

    use super::*;
    use crate::fixtures::date;

    /// Source that counts fetches, to prove validation precedes I/O.
    struct CountingSource {
        fetches: AtomicUsize,
    }

    impl TransactionSource for CountingSource {
        fn transactions_between(&self, _range: &DateRange) -> InsightResult<Vec<Transaction>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Transaction::new(
                date(2024, 3, 1).and_hms_opt(9, 0, 0).unwrap(),
                4.0,
                PaymentMethod::Cash,
                "Latte",
            )])
        }

        fn transactions_through(&self, end: NaiveDate) -> InsightResult<Vec<Transaction>> {
            let range = DateRange::new(NaiveDate::MIN, end)?;
            self.transactions_between(&range)
        }
    }

    fn engine() -> (Arc<CountingSource>, InsightEngine) {
        let source = Arc::new(CountingSource {
            fetches: AtomicUsize::new(0),
        });
        let engine = InsightEngine::new(source.clone(), &AppConfig::default());
        (source, engine)
    }

    fn march() -> DateRange {
        DateRange::new(date(2024, 3, 1), date(2024, 3, 31)).unwrap()
    }

    #[test]
    fn test_parameter_errors_before_fetch() {
        let (source, engine) = engine();
        let err = engine.product_performance(&march(), "price", None).unwrap_err();
        assert_eq!(err.code(), "INVALID_SORT_FIELD");
        assert!(engine.revenue_trends(&march(), "decade", 5).is_err());
        assert!(engine.hourly(&march(), Some(9)).is_err());
        assert!(engine.capacity(&march(), Some(0)).is_err());
        assert!(engine.product_trend(None, &march()).is_err());
        assert!(engine.customer(Some(" "), &march()).is_err());
        assert_eq!(
            engine.compare(Some(march()), None).unwrap_err().code(),
            "MISSING_REQUIRED_PARAMETER"
        );
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);

        engine.revenue_metrics(&march()).unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_growth_rate_fetches_preceding_period() {
        let (source, engine) = engine();
        let growth = engine.growth_rate(&march()).unwrap();
        assert_eq!(growth.previous.end, date(2024, 2, 29));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }
}
