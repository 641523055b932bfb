//! Inventory signals: moving-average demand forecast, safety stock,
//! reorder point, economic order quantity and waste risk per product.

use chrono::{Days, NaiveDate};
use pos_core::config::InventoryConfig;
use pos_core::error::{InsightError, InsightResult};
use pos_core::types::{CategorizedTransaction, Category, DateRange};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregator::{group_by, mean_and_std_dev, ratio, within};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn from_history(days: usize) -> Self {
        match days {
            7..=usize::MAX => Self::High,
            3..=6 => Self::Medium,
            _ => Self::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WasteRisk {
    High,
    Medium,
    Low,
}

/// Where the demand volatility used for safety stock came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilitySource {
    /// Sample standard deviation of daily demand.
    Observed,
    /// Fewer than two demand points; a fixed share of mean demand is used.
    EstimatedFromMean,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryRecommendation {
    pub product: String,
    pub category: Category,
    /// Days with at least one sale of this product.
    pub days_of_history: usize,
    /// Calendar days from the first sale through the range end.
    pub days_observed: usize,
    pub total_demand: u64,
    pub avg_daily_demand: f64,
    pub demand_volatility: f64,
    pub volatility_source: VolatilitySource,
    pub moving_average: f64,
    pub forecast: Vec<ForecastPoint>,
    pub confidence: Confidence,
    pub safety_stock: u64,
    pub reorder_point: u64,
    pub economic_order_quantity: u64,
    pub waste_risk: WasteRisk,
    pub insufficient_data: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryReport {
    pub range: DateRange,
    pub horizon_days: usize,
    pub lead_time_days: u32,
    pub products: Vec<InventoryRecommendation>,
    pub high_waste_risk: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForecastOptions {
    pub horizon_days: Option<usize>,
    /// When set, products with less history are flagged and the call fails
    /// if no product reaches it.
    pub min_history_days: Option<usize>,
}

/// Demand statistics for one product over a run of calendar days, days
/// without a sale counting as zero demand.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandStats {
    pub days: usize,
    pub active_days: usize,
    pub total: u64,
    pub mean: f64,
    pub std_dev: Option<f64>,
    pub moving_average: f64,
    pub low_demand_days: usize,
}

impl DemandStats {
    /// `daily` must be ordered oldest first.
    pub fn from_daily(daily: &[f64], window: usize) -> Self {
        let (mean, std_dev) = mean_and_std_dev(daily);
        let recent = &daily[daily.len().saturating_sub(window.max(1))..];
        let (moving_average, _) = mean_and_std_dev(recent);
        let low_demand_days = daily.iter().filter(|q| **q < mean * 0.25).count();
        Self {
            days: daily.len(),
            active_days: daily.iter().filter(|q| **q > 0.0).count(),
            total: daily.iter().sum::<f64>() as u64,
            mean,
            std_dev,
            moving_average,
            low_demand_days,
        }
    }
}

pub struct InventoryAnalyzer {
    config: InventoryConfig,
}

impl InventoryAnalyzer {
    pub fn new(config: &InventoryConfig) -> Self {
        info!(
            order_cost = config.order_cost,
            holding_cost_rate = config.holding_cost_rate,
            lead_time_days = config.lead_time_days,
            "Inventory analyzer initialized"
        );
        Self {
            config: config.clone(),
        }
    }

    pub fn validate(&self, options: &ForecastOptions) -> InsightResult<()> {
        if options.horizon_days == Some(0) {
            return Err(InsightError::InvalidParameter {
                name: "horizonDays",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(horizon) = options.horizon_days {
            if horizon > self.config.max_horizon_days {
                return Err(InsightError::InvalidParameter {
                    name: "horizonDays",
                    reason: format!("must be at most {}", self.config.max_horizon_days),
                });
            }
        }
        if options.min_history_days == Some(0) {
            return Err(InsightError::InvalidParameter {
                name: "minHistoryDays",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn recommend(
        &self,
        transactions: &[CategorizedTransaction],
        range: &DateRange,
        options: ForecastOptions,
    ) -> InsightResult<InventoryReport> {
        self.validate(&options)?;
        let horizon = options
            .horizon_days
            .unwrap_or(self.config.forecast_horizon_days);
        let required = options.min_history_days.unwrap_or(2);

        let mut products: Vec<InventoryRecommendation> =
            group_by(within(transactions, range), |tx| tx.product_name.as_str())
                .into_iter()
                .map(|(name, group)| {
                    let category = group[0].category;
                    let daily = daily_demand(&group, range.end);
                    let stats = DemandStats::from_daily(&daily, self.config.forecast_window_days);
                    self.recommendation(name, category, &stats, range.end, horizon, required)
                })
                .collect();
        products.sort_by(|a, b| b.total_demand.cmp(&a.total_demand));

        let short: Vec<&str> = products
            .iter()
            .filter(|p| p.insufficient_data)
            .map(|p| p.product.as_str())
            .collect();
        if let Some(min) = options.min_history_days {
            if short.len() == products.len() {
                let available = products.iter().map(|p| p.days_of_history).max().unwrap_or(0);
                return Err(InsightError::InsufficientData {
                    required: min,
                    available,
                });
            }
        }
        if !short.is_empty() {
            warn!(
                range = %range,
                products = ?short,
                required_days = required,
                "Forecast based on insufficient history"
            );
        }

        let high_waste_risk = products
            .iter()
            .filter(|p| p.waste_risk == WasteRisk::High)
            .map(|p| p.product.clone())
            .collect();

        debug!(range = %range, products = products.len(), horizon, "Inventory report computed");

        Ok(InventoryReport {
            range: *range,
            horizon_days: horizon,
            lead_time_days: self.config.lead_time_days,
            products,
            high_waste_risk,
        })
    }

    fn recommendation(
        &self,
        product: &str,
        category: Category,
        stats: &DemandStats,
        last_day: NaiveDate,
        horizon: usize,
        required: usize,
    ) -> InventoryRecommendation {
        let (volatility, volatility_source) = match stats.std_dev {
            Some(sd) => (sd, VolatilitySource::Observed),
            None => (
                stats.mean * self.config.fallback_volatility_ratio,
                VolatilitySource::EstimatedFromMean,
            ),
        };
        let safety_stock = (stats.mean + self.config.safety_factor * volatility).ceil();
        let reorder_point =
            (stats.mean * f64::from(self.config.lead_time_days) + safety_stock).ceil();
        let economic_order_quantity = ratio(
            2.0 * stats.total as f64 * self.config.order_cost,
            stats.mean * self.config.holding_cost_rate,
        )
        .sqrt()
        .ceil();

        let forecast = (1..=horizon as u64)
            .filter_map(|offset| last_day.checked_add_days(Days::new(offset)))
            .map(|date| ForecastPoint {
                date,
                quantity: stats.moving_average,
            })
            .collect();

        InventoryRecommendation {
            product: product.to_string(),
            category,
            days_of_history: stats.active_days,
            days_observed: stats.days,
            total_demand: stats.total,
            avg_daily_demand: stats.mean,
            demand_volatility: volatility,
            volatility_source,
            moving_average: stats.moving_average,
            forecast,
            confidence: Confidence::from_history(stats.active_days),
            safety_stock: safety_stock as u64,
            reorder_point: reorder_point as u64,
            economic_order_quantity: economic_order_quantity as u64,
            waste_risk: waste_risk(stats, volatility),
            insufficient_data: stats.active_days < required,
        }
    }
}

/// Units sold per calendar day from the product's first sale in `rows`
/// through `end`, oldest first.
fn daily_demand(rows: &[&CategorizedTransaction], end: NaiveDate) -> Vec<f64> {
    let Some(first) = rows.iter().map(|tx| tx.date()).min() else {
        return Vec::new();
    };
    let days = (end - first).num_days().max(0) as usize + 1;
    let mut daily = vec![0.0; days];
    for tx in rows {
        let offset = (tx.date() - first).num_days();
        if let Some(slot) = usize::try_from(offset).ok().and_then(|i| daily.get_mut(i)) {
            *slot += f64::from(tx.quantity);
        }
    }
    daily
}

pub fn waste_risk(stats: &DemandStats, volatility: f64) -> WasteRisk {
    if stats.mean < 1.0 || ratio(volatility, stats.mean) > 1.0 {
        return WasteRisk::High;
    }
    if ratio(stats.low_demand_days as f64, stats.days as f64) > 0.3 {
        return WasteRisk::Medium;
    }
    WasteRisk::Low
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures::{cash, date, units};

    fn analyzer() -> InventoryAnalyzer {
        InventoryAnalyzer::new(&InventoryConfig::default())
    }

    fn march() -> DateRange {
        through(31)
    }

    fn through(day: u32) -> DateRange {
        DateRange::new(date(2024, 3, 1), date(2024, 3, day)).unwrap()
    }

    fn daily_sales(product: &str, quantities: &[u32]) -> Vec<CategorizedTransaction> {
        quantities
            .iter()
            .enumerate()
            .map(|(i, q)| units(cash(date(2024, 3, 1 + i as u32), 9, 4.0, product), *q))
            .collect()
    }

    #[test]
    fn test_moving_average_uses_last_seven_days() {
        let stats = DemandStats::from_daily(&[100.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0], 7);
        assert!((stats.moving_average - 4.0).abs() < 1e-9);
        assert_eq!(stats.days, 8);
        let short = DemandStats::from_daily(&[2.0, 4.0], 7);
        assert!((short.moving_average - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_stock_formulas() {
        let rows = daily_sales("Latte", &[10, 12, 8, 10]);
        let report = analyzer()
            .recommend(&rows, &through(4), ForecastOptions::default())
            .unwrap();
        let latte = &report.products[0];
        let sd = (8.0f64 / 3.0).sqrt();
        assert_eq!(latte.volatility_source, VolatilitySource::Observed);
        assert!((latte.demand_volatility - sd).abs() < 1e-9);
        assert_eq!(latte.safety_stock, (10.0 + 2.0 * sd).ceil() as u64);
        assert_eq!(latte.reorder_point, (20.0 + latte.safety_stock as f64).ceil() as u64);
        assert_eq!(
            latte.economic_order_quantity,
            (2.0 * 40.0 * 10.0 / (10.0 * 0.2f64)).sqrt().ceil() as u64
        );
        assert_eq!(latte.confidence, Confidence::Medium);
        assert_eq!(latte.waste_risk, WasteRisk::Low);
        assert_eq!(latte.forecast.len(), 7);
        assert_eq!(latte.forecast[0].date, date(2024, 3, 5));
        assert!((latte.forecast[6].quantity - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_day_uses_explicit_volatility_proxy() {
        let rows = daily_sales("Mocha", &[5]);
        let report = analyzer()
            .recommend(&rows, &through(1), ForecastOptions::default())
            .unwrap();
        let mocha = &report.products[0];
        assert_eq!(mocha.volatility_source, VolatilitySource::EstimatedFromMean);
        assert!((mocha.demand_volatility - 1.0).abs() < 1e-9);
        assert_eq!(mocha.safety_stock, 7);
        assert!(mocha.insufficient_data);
        assert_eq!(mocha.confidence, Confidence::Low);
        assert!(mocha.avg_daily_demand.is_finite());
    }

    #[test]
    fn test_days_without_sales_count_as_zero_demand() {
        let rows = vec![cash(date(2024, 3, 15), 10, 3.5, "Scone")];
        let report = analyzer()
            .recommend(&rows, &march(), ForecastOptions::default())
            .unwrap();
        let scone = &report.products[0];
        assert_eq!(scone.days_of_history, 1);
        assert_eq!(scone.days_observed, 17);
        assert!((scone.avg_daily_demand - 1.0 / 17.0).abs() < 1e-9);
        assert_eq!(scone.waste_risk, WasteRisk::High);
        assert_eq!(report.high_waste_risk, vec!["Scone".to_string()]);
        assert!(scone.forecast[0].quantity < 1.0);
        assert_eq!(scone.confidence, Confidence::Low);
    }

    #[test]
    fn test_zero_filled_series() {
        let a = cash(date(2024, 3, 2), 9, 4.0, "Latte");
        let b = units(cash(date(2024, 3, 4), 9, 4.0, "Latte"), 3);
        let c = cash(date(2024, 3, 4), 15, 4.0, "Latte");
        let daily = daily_demand(&[&a, &b, &c], date(2024, 3, 5));
        assert_eq!(daily, vec![1.0, 0.0, 4.0, 0.0]);
        let stats = DemandStats::from_daily(&daily, 7);
        assert_eq!(stats.active_days, 2);
        assert_eq!(stats.low_demand_days, 2);
    }

    #[test]
    fn test_horizon_is_bounded() {
        let analyzer = analyzer();
        let at_cap = ForecastOptions {
            horizon_days: Some(InventoryConfig::default().max_horizon_days),
            min_history_days: None,
        };
        assert!(analyzer.validate(&at_cap).is_ok());
        let err = analyzer
            .validate(&ForecastOptions {
                horizon_days: Some(1_000_000_000),
                min_history_days: None,
            })
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_waste_risk_classes() {
        let volatile = DemandStats::from_daily(&[1.0, 1.0, 1.0, 30.0], 7);
        assert_eq!(waste_risk(&volatile, volatile.std_dev.unwrap()), WasteRisk::High);

        let lumpy =
            DemandStats::from_daily(&[10.0, 10.0, 10.0, 1.0, 1.0, 10.0, 10.0, 1.0, 1.0, 10.0], 7);
        let sd = lumpy.std_dev.unwrap();
        assert!(sd / lumpy.mean <= 1.0);
        assert_eq!(waste_risk(&lumpy, sd), WasteRisk::Medium);

        let steady = DemandStats::from_daily(&[10.0; 7], 7);
        assert_eq!(waste_risk(&steady, 0.0), WasteRisk::Low);
    }

    #[test]
    fn test_min_history_requirement() {
        let mut rows = daily_sales("Tea", &[1, 2]);
        rows.extend(daily_sales("Latte", &[3, 3, 3, 3]));
        let options = ForecastOptions {
            horizon_days: Some(3),
            min_history_days: Some(3),
        };
        let report = analyzer().recommend(&rows, &march(), options).unwrap();
        assert_eq!(report.horizon_days, 3);
        assert_eq!(report.products[0].product, "Latte");
        assert!(!report.products[0].insufficient_data);
        assert!(report.products[1].insufficient_data);

        let strict = ForecastOptions {
            horizon_days: None,
            min_history_days: Some(10),
        };
        let err = analyzer().recommend(&rows, &march(), strict).unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_DATA");
        assert!(analyzer()
            .recommend(
                &rows,
                &march(),
                ForecastOptions {
                    horizon_days: Some(0),
                    min_history_days: None
                }
            )
            .is_err());
    }
}
