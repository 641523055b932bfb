//! Cached front of the insight engine. Every operation renders a request key,
//! serves a fresh cached response when one exists and otherwise computes and
//! stores it. Rejected requests are never cached.

use std::sync::Arc;

use pos_analytics::engine::{AnalysisPass, Snapshot};
use pos_analytics::inventory::ForecastOptions;
use pos_analytics::product::{product_key, ProductSortKey};
use pos_analytics::InsightEngine;
use pos_cache::{CacheDomain, CacheKey, ResponseCache};
use pos_core::{DateRange, InsightResult};
use serde_json::Value;
use tracing::info;

#[derive(Clone)]
pub struct InsightService {
    engine: Arc<InsightEngine>,
    cache: ResponseCache,
}

fn ranged(endpoint: &str, range: &DateRange) -> CacheKey {
    CacheKey::new(endpoint)
        .param("startDate", range.start)
        .param("endDate", range.end)
        .build()
}

impl InsightService {
    pub fn new(engine: Arc<InsightEngine>, cache: ResponseCache) -> Self {
        Self { engine, cache }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn revenue_metrics(&self, range: &DateRange) -> InsightResult<Value> {
        self.cache.get_or_try_insert_with(
            ranged("revenue/metrics", range),
            CacheDomain::Revenue,
            || self.engine.revenue_metrics(range),
        )
    }

    pub fn growth_rate(&self, range: &DateRange) -> InsightResult<Value> {
        self.cache.get_or_try_insert_with(
            ranged("revenue/growth", range),
            CacheDomain::Revenue,
            || self.engine.growth_rate(range),
        )
    }

    pub fn compare(&self, a: Option<DateRange>, b: Option<DateRange>) -> InsightResult<Value> {
        let key = CacheKey::new("revenue/compare")
            .opt_param("periodA", a.as_ref())
            .opt_param("periodB", b.as_ref())
            .build();
        self.cache
            .get_or_try_insert_with(key, CacheDomain::Revenue, || self.engine.compare(a, b))
    }

    pub fn revenue_trends(
        &self,
        range: &DateRange,
        period: &str,
        limit: usize,
    ) -> InsightResult<Value> {
        let key = CacheKey::new("revenue/trends")
            .param("startDate", range.start)
            .param("endDate", range.end)
            .param("period", period)
            .param("limit", limit)
            .build();
        self.cache.get_or_try_insert_with(key, CacheDomain::Revenue, || {
            self.engine.revenue_trends(range, period, limit)
        })
    }

    pub fn yearly_revenue(&self, year: i32) -> InsightResult<Value> {
        let key = CacheKey::new("revenue/yearly").param("year", year).build();
        self.cache
            .get_or_try_insert_with(key, CacheDomain::Yearly, || self.engine.yearly_revenue(year))
    }

    pub fn product_performance(
        &self,
        range: &DateRange,
        sort_by: &str,
        limit: Option<usize>,
    ) -> InsightResult<Value> {
        let key = CacheKey::new("products/performance")
            .param("startDate", range.start)
            .param("endDate", range.end)
            .param("sortBy", sort_by)
            .opt_param("limit", limit)
            .build();
        self.cache.get_or_try_insert_with(key, CacheDomain::Product, || {
            self.engine.product_performance(range, sort_by, limit)
        })
    }

    pub fn product_trend(&self, product: Option<&str>, range: &DateRange) -> InsightResult<Value> {
        let key = CacheKey::new("products/trend")
            .param("startDate", range.start)
            .param("endDate", range.end)
            .opt_param("product", product.map(product_key))
            .build();
        self.cache.get_or_try_insert_with(key, CacheDomain::Product, || {
            self.engine.product_trend(product, range)
        })
    }

    pub fn seasonal(&self, year: i32) -> InsightResult<Value> {
        let key = CacheKey::new("products/seasonal").param("year", year).build();
        self.cache
            .get_or_try_insert_with(key, CacheDomain::Yearly, || self.engine.seasonal(year))
    }

    pub fn hourly(&self, range: &DateRange, day_of_week: Option<u8>) -> InsightResult<Value> {
        let key = CacheKey::new("traffic/hourly")
            .param("startDate", range.start)
            .param("endDate", range.end)
            .opt_param("dayOfWeek", day_of_week)
            .build();
        self.cache.get_or_try_insert_with(key, CacheDomain::Traffic, || {
            self.engine.hourly(range, day_of_week)
        })
    }

    pub fn daily_traffic(&self, range: &DateRange) -> InsightResult<Value> {
        self.cache.get_or_try_insert_with(
            ranged("traffic/daily", range),
            CacheDomain::Traffic,
            || self.engine.daily_traffic(range),
        )
    }

    pub fn weekly_patterns(&self, range: &DateRange) -> InsightResult<Value> {
        self.cache.get_or_try_insert_with(
            ranged("traffic/weekly", range),
            CacheDomain::Traffic,
            || self.engine.weekly_patterns(range),
        )
    }

    pub fn staffing(&self, range: &DateRange, day_of_week: u8) -> InsightResult<Value> {
        let key = CacheKey::new("traffic/staffing")
            .param("startDate", range.start)
            .param("endDate", range.end)
            .param("dayOfWeek", day_of_week)
            .build();
        self.cache.get_or_try_insert_with(key, CacheDomain::Traffic, || {
            self.engine.staffing(range, day_of_week)
        })
    }

    pub fn capacity(&self, range: &DateRange, max_capacity: Option<u32>) -> InsightResult<Value> {
        let key = CacheKey::new("traffic/capacity")
            .param("startDate", range.start)
            .param("endDate", range.end)
            .opt_param("maxCapacity", max_capacity)
            .build();
        self.cache.get_or_try_insert_with(key, CacheDomain::Traffic, || {
            self.engine.capacity(range, max_capacity)
        })
    }

    pub fn customer_insights(&self, range: &DateRange) -> InsightResult<Value> {
        self.cache.get_or_try_insert_with(
            ranged("customers/insights", range),
            CacheDomain::Customer,
            || self.engine.customer_insights(range),
        )
    }

    pub fn customer_profiles(&self, range: &DateRange) -> InsightResult<Value> {
        self.cache.get_or_try_insert_with(
            ranged("customers/profiles", range),
            CacheDomain::Customer,
            || self.engine.customer_profiles(range),
        )
    }

    pub fn customer(&self, token: Option<&str>, range: &DateRange) -> InsightResult<Value> {
        let key = CacheKey::new("customers/profile")
            .param("startDate", range.start)
            .param("endDate", range.end)
            .opt_param("customer", token)
            .build();
        self.cache.get_or_try_insert_with(key, CacheDomain::Customer, || {
            self.engine.customer(token, range)
        })
    }

    pub fn retention(&self, range: &DateRange) -> InsightResult<Value> {
        self.cache.get_or_try_insert_with(
            ranged("customers/retention", range),
            CacheDomain::Customer,
            || self.engine.retention(range),
        )
    }

    pub fn cohorts(&self, range: &DateRange) -> InsightResult<Value> {
        self.cache.get_or_try_insert_with(
            ranged("customers/cohorts", range),
            CacheDomain::Customer,
            || self.engine.cohorts(range),
        )
    }

    pub fn inventory_report(
        &self,
        range: &DateRange,
        options: ForecastOptions,
    ) -> InsightResult<Value> {
        let key = CacheKey::new("inventory/recommendations")
            .param("startDate", range.start)
            .param("endDate", range.end)
            .opt_param("horizonDays", options.horizon_days)
            .opt_param("minHistoryDays", options.min_history_days)
            .build();
        self.cache.get_or_try_insert_with(key, CacheDomain::Inventory, || {
            self.engine.inventory_report(range, options)
        })
    }

    /// Fetches one analysis pass and computes the six sections on blocking
    /// workers in parallel, all reading the same shared rows.
    pub async fn snapshot(&self, range: &DateRange) -> anyhow::Result<Snapshot> {
        let engine = self.engine.clone();
        let prepare_range = *range;
        let pass = tokio::task::spawn_blocking(move || engine.prepare(&prepare_range)).await??;

        let revenue = self.on_pass(&pass, |engine, pass| {
            Ok(engine.revenue().metrics(&pass.rows, &pass.range))
        });
        let products = self.on_pass(&pass, |engine, pass| {
            engine
                .products()
                .performance(&pass.rows, &pass.range, ProductSortKey::Revenue, None)
        });
        let hourly = self.on_pass(&pass, |engine, pass| {
            engine.traffic().hourly(&pass.rows, &pass.range, None)
        });
        let daily = self.on_pass(&pass, |engine, pass| {
            Ok(engine.traffic().daily(&pass.rows, &pass.range))
        });
        let customers = self.on_pass(&pass, |engine, pass| {
            Ok(engine.customers().insights(&pass.history, &pass.range))
        });
        let inventory = self.on_pass(&pass, |engine, pass| {
            engine
                .inventory()
                .recommend(&pass.rows, &pass.range, ForecastOptions::default())
        });

        let (revenue, products, hourly, daily, customers, inventory) =
            tokio::try_join!(revenue, products, hourly, daily, customers, inventory)?;

        let snapshot = Snapshot {
            revenue: revenue?,
            products: products?,
            hourly: hourly?,
            daily: daily?,
            customers: customers?,
            inventory: inventory?,
        };
        info!(
            range = %range,
            transactions = snapshot.revenue.transaction_count,
            "Concurrent snapshot computed"
        );
        Ok(snapshot)
    }

    fn on_pass<T, F>(&self, pass: &AnalysisPass, f: F) -> tokio::task::JoinHandle<InsightResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&InsightEngine, &AnalysisPass) -> InsightResult<T> + Send + 'static,
    {
        let engine = self.engine.clone();
        let pass = pass.clone();
        tokio::task::spawn_blocking(move || f(&engine, &pass))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pos_core::config::AppConfig;
    use pos_core::types::{PaymentMethod, Transaction};
    use pos_core::InMemoryTransactionStore;

    fn at(d: u32, h: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn service() -> InsightService {
        service_with(vec![
            Transaction::new(at(1, 8), 38.7, PaymentMethod::Cash, "Latte"),
            Transaction::new(at(1, 9), 28.9, PaymentMethod::Card, "Americano")
                .with_customer("ANON-0000-0000-0001"),
            Transaction::new(at(2, 8), 26.1, PaymentMethod::Cash, "Espresso"),
            Transaction::new(at(4, 14), 32.8, PaymentMethod::Card, "Hot Chocolate")
                .with_customer("ANON-0000-0000-0001"),
        ])
    }

    fn service_with(transactions: Vec<Transaction>) -> InsightService {
        let store = InMemoryTransactionStore::new(transactions).unwrap();
        let config = AppConfig::default();
        let engine = Arc::new(InsightEngine::new(Arc::new(store), &config));
        InsightService::new(engine, ResponseCache::new(&config.cache))
    }

    fn march() -> DateRange {
        DateRange::parse("2024-03-01", "2024-03-31").unwrap()
    }

    #[test]
    fn test_responses_are_cached_per_request() {
        let service = service();
        let first = service.revenue_metrics(&march()).unwrap();
        let again = service.revenue_metrics(&march()).unwrap();
        assert_eq!(first, again);
        assert_eq!(service.cache().len(), 1);

        service.hourly(&march(), Some(5)).unwrap();
        service.hourly(&march(), None).unwrap();
        assert_eq!(service.cache().len(), 3);
        assert_eq!(service.cache().invalidate_pattern("traffic/*"), 2);
    }

    #[test]
    fn test_rejections_are_not_cached() {
        let service = service();
        let err = service.product_performance(&march(), "price", None).unwrap_err();
        assert_eq!(err.code(), "INVALID_SORT_FIELD");
        let err = service.hourly(&march(), Some(7)).unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMETER");
        assert!(service.cache().is_empty());
    }

    #[test]
    fn test_product_trend_key_matches_engine_lookup() {
        let service = service_with(vec![
            Transaction::new(at(3, 9), 4.2, PaymentMethod::Cash, "Café Crème"),
            Transaction::new(at(5, 9), 3.1, PaymentMethod::Cash, "Latte"),
        ]);

        let found = service.product_trend(Some("café crème"), &march()).unwrap();
        assert_eq!(found["name"], "Café Crème");

        // ASCII folding leaves É distinct from é, so the engine rejects this
        // name and the cached entry above must not answer it.
        let err = service.engine.product_trend(Some("CAFÉ CRÈME"), &march()).unwrap_err();
        assert_eq!(err.code(), "RESOURCE_NOT_FOUND");
        let err = service.product_trend(Some("CAFÉ CRÈME"), &march()).unwrap_err();
        assert_eq!(err.code(), "RESOURCE_NOT_FOUND");

        // Names the engine treats as equal share one entry.
        service.product_trend(Some(" LATTE "), &march()).unwrap();
        service.product_trend(Some("latte"), &march()).unwrap();
        assert_eq!(service.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_snapshot_matches_sequential() {
        let service = service();
        let concurrent = service.snapshot(&march()).await.unwrap();
        let sequential = service.engine.snapshot(&march()).unwrap();
        assert_eq!(concurrent, sequential);
        assert_eq!(concurrent.revenue.transaction_count, 4);
    }
}
