//! Revenue analytics: totals, daily series, payment mix, growth and trends.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use pos_core::error::{InsightError, InsightResult};
use pos_core::types::{CategorizedTransaction, DateRange, PaymentMethod};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregator::{self, group_by, month_key, percent_change, ratio, within, Totals};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyBucket {
    pub date: NaiveDate,
    pub revenue: f64,
    pub transactions: usize,
    pub unique_customers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentBreakdown {
    pub method: PaymentMethod,
    pub revenue: f64,
    pub transactions: usize,
    pub percent_of_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueMetrics {
    pub range: DateRange,
    pub total_revenue: f64,
    pub transaction_count: usize,
    pub avg_transaction_value: f64,
    /// Distinct customer tokens. Untracked transactions are not counted.
    pub unique_customers: usize,
    pub untracked_transactions: usize,
    pub daily_revenue: Vec<DailyBucket>,
    pub payment_method_breakdown: Vec<PaymentBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthRate {
    pub current: DateRange,
    pub previous: DateRange,
    pub current_revenue: f64,
    pub previous_revenue: f64,
    /// Percent change versus the preceding equal-length period.
    pub growth_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodComparison {
    pub period_a: RevenueMetrics,
    pub period_b: RevenueMetrics,
    pub revenue_change: f64,
    pub revenue_change_percent: f64,
    pub transaction_change: i64,
    pub transaction_change_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendPeriod {
    Hour,
    Day,
    Week,
    Month,
}

impl TrendPeriod {
    fn bucket_start(&self, at: NaiveDateTime) -> NaiveDateTime {
        let date = at.date();
        let midnight = |d: NaiveDate| d.and_time(chrono::NaiveTime::MIN);
        match self {
            Self::Hour => midnight(date) + chrono::Duration::hours(i64::from(at.hour())),
            Self::Day => midnight(date),
            Self::Week => midnight(aggregator::week_start(date)),
            Self::Month => {
                let (year, month) = month_key(date);
                NaiveDate::from_ymd_opt(year, month, 1)
                    .map(midnight)
                    .unwrap_or_else(|| midnight(date))
            }
        }
    }
}

impl FromStr for TrendPeriod {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" | "hourly" => Ok(Self::Hour),
            "day" | "daily" => Ok(Self::Day),
            "week" | "weekly" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            other => Err(InsightError::InvalidParameter {
                name: "period",
                reason: format!("unknown period {other:?}, expected hour, day, week or month"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendBucket {
    pub period_start: NaiveDateTime,
    pub revenue: f64,
    pub transactions: usize,
    pub avg_transaction_value: f64,
    pub unique_customers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueTrends {
    pub range: DateRange,
    pub period: TrendPeriod,
    /// Most recent buckets first.
    pub buckets: Vec<TrendBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthBucket {
    pub month: u32,
    pub revenue: f64,
    pub transactions: usize,
    pub avg_transaction_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlyRevenue {
    pub year: i32,
    pub months: Vec<MonthBucket>,
    pub total_revenue: f64,
    pub total_transactions: usize,
    /// Highest-revenue month (1-12); earliest wins on ties. `None` for an empty year.
    pub best_month: Option<u32>,
}

pub struct RevenueAnalyzer;

impl RevenueAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn metrics(
        &self,
        transactions: &[CategorizedTransaction],
        range: &DateRange,
    ) -> RevenueMetrics {
        let rows = within(transactions, range);
        let totals = Totals::of(rows.clone());

        let mut daily_revenue: Vec<DailyBucket> = group_by(rows.clone(), |tx| tx.date())
            .into_iter()
            .map(|(date, group)| {
                let day = Totals::of(group);
                DailyBucket {
                    date,
                    revenue: day.revenue,
                    transactions: day.transactions,
                    unique_customers: day.unique_customers,
                }
            })
            .collect();
        daily_revenue.sort_by_key(|d| d.date);

        let payment_method_breakdown = group_by(rows, |tx| tx.payment_method)
            .into_iter()
            .map(|(method, group)| {
                let part = Totals::of(group);
                PaymentBreakdown {
                    method,
                    revenue: part.revenue,
                    transactions: part.transactions,
                    percent_of_revenue: ratio(part.revenue, totals.revenue) * 100.0,
                }
            })
            .collect();

        debug!(
            range = %range,
            transactions = totals.transactions,
            days = daily_revenue.len(),
            "Revenue metrics computed"
        );

        RevenueMetrics {
            range: *range,
            total_revenue: totals.revenue,
            transaction_count: totals.transactions,
            avg_transaction_value: totals.avg_transaction_value(),
            unique_customers: totals.unique_customers,
            untracked_transactions: totals.untracked_transactions,
            daily_revenue,
            payment_method_breakdown,
        }
    }

    /// `current` and `previous` may hold more rows than their ranges; only
    /// rows inside each range are counted.
    pub fn growth_rate(
        &self,
        range: &DateRange,
        current: &[CategorizedTransaction],
        previous_range: &DateRange,
        previous: &[CategorizedTransaction],
    ) -> GrowthRate {
        let current_revenue = aggregator::sum(within(current, range), |tx| tx.amount);
        let previous_revenue = aggregator::sum(within(previous, previous_range), |tx| tx.amount);
        GrowthRate {
            current: *range,
            previous: *previous_range,
            current_revenue,
            previous_revenue,
            growth_rate: percent_change(current_revenue, previous_revenue),
        }
    }

    /// Changes are measured from period B (baseline) to period A.
    pub fn compare(
        &self,
        range_a: &DateRange,
        transactions_a: &[CategorizedTransaction],
        range_b: &DateRange,
        transactions_b: &[CategorizedTransaction],
    ) -> PeriodComparison {
        let period_a = self.metrics(transactions_a, range_a);
        let period_b = self.metrics(transactions_b, range_b);
        let revenue_change = period_a.total_revenue - period_b.total_revenue;
        let revenue_change_percent = percent_change(period_a.total_revenue, period_b.total_revenue);
        let transaction_change =
            period_a.transaction_count as i64 - period_b.transaction_count as i64;
        let transaction_change_percent = percent_change(
            period_a.transaction_count as f64,
            period_b.transaction_count as f64,
        );
        PeriodComparison {
            period_a,
            period_b,
            revenue_change,
            revenue_change_percent,
            transaction_change,
            transaction_change_percent,
        }
    }

    pub fn trends(
        &self,
        transactions: &[CategorizedTransaction],
        range: &DateRange,
        period: TrendPeriod,
        limit: usize,
    ) -> InsightResult<RevenueTrends> {
        if limit == 0 {
            return Err(InsightError::InvalidParameter {
                name: "limit",
                reason: "must be at least 1".to_string(),
            });
        }

        let mut buckets: Vec<TrendBucket> =
            group_by(within(transactions, range), |tx| period.bucket_start(tx.occurred_at))
                .into_iter()
                .map(|(period_start, group)| {
                    let totals = Totals::of(group);
                    TrendBucket {
                        period_start,
                        revenue: totals.revenue,
                        transactions: totals.transactions,
                        avg_transaction_value: totals.avg_transaction_value(),
                        unique_customers: totals.unique_customers,
                    }
                })
                .collect();
        buckets.sort_by(|a, b| b.period_start.cmp(&a.period_start));
        buckets.truncate(limit);

        Ok(RevenueTrends {
            range: *range,
            period,
            buckets,
        })
    }

    pub fn yearly(
        &self,
        transactions: &[CategorizedTransaction],
        year: i32,
    ) -> InsightResult<YearlyRevenue> {
        let range = DateRange::year(year)?;
        let by_month = group_by(within(transactions, &range), |tx| month_key(tx.date()).1);

        let months: Vec<MonthBucket> = (1..=12u32)
            .map(|month| {
                let totals = by_month
                    .iter()
                    .find(|(m, _)| *m == month)
                    .map(|(_, group)| Totals::of(group.iter().copied()))
                    .unwrap_or_default();
                MonthBucket {
                    month,
                    revenue: totals.revenue,
                    transactions: totals.transactions,
                    avg_transaction_value: totals.avg_transaction_value(),
                }
            })
            .collect();

        let best_month = months
            .iter()
            .filter(|m| m.transactions > 0)
            .fold(None::<&MonthBucket>, |best, m| match best {
                Some(b) if b.revenue >= m.revenue => Some(b),
                _ => Some(m),
            })
            .map(|m| m.month);

        Ok(YearlyRevenue {
            year,
            total_revenue: months.iter().map(|m| m.revenue).sum(),
            total_transactions: months.iter().map(|m| m.transactions).sum(),
            months,
            best_month,
        })
    }
}

impl Default for RevenueAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures::{card, cash, date};

    fn sample() -> Vec<CategorizedTransaction> {
        vec![
            card(date(2024, 3, 1), 9, 38.7, "Latte", Some("c1")),
            cash(date(2024, 3, 1), 14, 25.0, "Espresso"),
            card(date(2024, 3, 2), 10, 30.0, "Americano", None),
        ]
    }

    #[test]
    fn test_metrics_example() {
        let range = DateRange::new(date(2024, 3, 1), date(2024, 3, 2)).unwrap();
        let metrics = RevenueAnalyzer::new().metrics(&sample(), &range);

        assert!((metrics.total_revenue - 93.7).abs() < 0.01);
        assert_eq!(metrics.transaction_count, 3);
        assert!((metrics.avg_transaction_value - 31.23).abs() < 0.01);
        assert_eq!(metrics.unique_customers, 1);
        assert_eq!(metrics.untracked_transactions, 2);

        assert_eq!(metrics.daily_revenue.len(), 2);
        assert_eq!(metrics.daily_revenue[0].date, date(2024, 3, 1));
        assert!((metrics.daily_revenue[0].revenue - 63.7).abs() < 0.01);
        assert_eq!(metrics.daily_revenue[0].transactions, 2);
        assert!((metrics.daily_revenue[1].revenue - 30.0).abs() < 0.01);

        let card_share = metrics
            .payment_method_breakdown
            .iter()
            .find(|p| p.method == PaymentMethod::Card)
            .unwrap();
        assert_eq!(card_share.transactions, 2);
        assert!((card_share.percent_of_revenue - 68.7 / 93.7 * 100.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_range_has_zero_average() {
        let range = DateRange::new(date(2025, 1, 1), date(2025, 1, 31)).unwrap();
        let metrics = RevenueAnalyzer::new().metrics(&sample(), &range);
        assert_eq!(metrics.transaction_count, 0);
        assert_eq!(metrics.avg_transaction_value, 0.0);
        assert!(metrics.daily_revenue.is_empty());
    }

    #[test]
    fn test_growth_rate_edges() {
        let analyzer = RevenueAnalyzer::new();
        let rows = sample();
        let current = DateRange::new(date(2024, 3, 2), date(2024, 3, 2)).unwrap();
        let previous = current.preceding().unwrap();

        let growth = analyzer.growth_rate(&current, &rows, &previous, &rows);
        assert!((growth.previous_revenue - 63.7).abs() < 1e-9);
        assert!((growth.growth_rate - (30.0 - 63.7) / 63.7 * 100.0).abs() < 1e-9);

        let empty: Vec<CategorizedTransaction> = Vec::new();
        let growth = analyzer.growth_rate(&current, &rows, &previous, &empty);
        assert_eq!(growth.growth_rate, 100.0);
        let growth = analyzer.growth_rate(&current, &empty, &previous, &empty);
        assert_eq!(growth.growth_rate, 0.0);
    }

    #[test]
    fn test_trends_newest_first_and_limited() {
        let range = DateRange::new(date(2024, 3, 1), date(2024, 3, 2)).unwrap();
        let trends = RevenueAnalyzer::new()
            .trends(&sample(), &range, TrendPeriod::Day, 1)
            .unwrap();
        assert_eq!(trends.buckets.len(), 1);
        assert_eq!(trends.buckets[0].period_start.date(), date(2024, 3, 2));

        let hourly = RevenueAnalyzer::new()
            .trends(&sample(), &range, "hour".parse().unwrap(), 10)
            .unwrap();
        assert_eq!(hourly.buckets.len(), 3);
        assert_eq!(hourly.buckets[2].period_start.hour(), 9);

        assert!("fortnight".parse::<TrendPeriod>().is_err());
        assert!(RevenueAnalyzer::new()
            .trends(&sample(), &range, TrendPeriod::Week, 0)
            .is_err());
    }

    #[test]
    fn test_yearly_has_twelve_months() {
        let rows = vec![
            cash(date(2024, 3, 1), 9, 10.0, "Latte"),
            cash(date(2024, 3, 9), 9, 5.0, "Tea"),
            cash(date(2024, 7, 4), 12, 15.0, "Tea"),
            cash(date(2023, 7, 4), 12, 99.0, "Tea"),
        ];
        let yearly = RevenueAnalyzer::new().yearly(&rows, 2024).unwrap();
        assert_eq!(yearly.months.len(), 12);
        assert_eq!(yearly.total_transactions, 3);
        assert!((yearly.total_revenue - 30.0).abs() < 1e-9);
        assert_eq!(yearly.months[1].transactions, 0);
        // March and July tie on revenue; the earlier month wins.
        assert_eq!(yearly.best_month, Some(3));
    }

    #[test]
    fn test_compare_measures_a_against_b() {
        let rows = sample();
        let a = DateRange::new(date(2024, 3, 1), date(2024, 3, 1)).unwrap();
        let b = DateRange::new(date(2024, 3, 2), date(2024, 3, 2)).unwrap();
        let comparison = RevenueAnalyzer::new().compare(&a, &rows, &b, &rows);
        assert!((comparison.revenue_change - 33.7).abs() < 1e-9);
        assert_eq!(comparison.transaction_change, 1);
        assert!((comparison.transaction_change_percent - 100.0).abs() < 1e-9);
    }
}
