//! Traffic analytics: hourly load, weekday patterns, staffing and capacity.

use std::collections::HashSet;

use chrono::NaiveDate;
use pos_core::config::TrafficConfig;
use pos_core::error::{InsightError, InsightResult};
use pos_core::types::{CategorizedTransaction, DateRange};
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregator::{group_by, ratio, within, Totals, DAY_NAMES};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourBucket {
    pub hour: usize,
    pub revenue: f64,
    pub transaction_count: usize,
    pub unique_customers: usize,
    pub avg_transaction_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyTraffic {
    pub range: DateRange,
    pub day_of_week: Option<u8>,
    /// Always 24 entries, hour 0 first.
    pub hours: Vec<HourBucket>,
    /// Busiest hours by transaction count, earliest hour first on ties.
    pub peak_hours: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayStats {
    pub date: NaiveDate,
    pub weekday: usize,
    pub day_name: &'static str,
    pub revenue: f64,
    pub transaction_count: usize,
    pub unique_customers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekdayAverage {
    pub weekday: usize,
    pub day_name: &'static str,
    /// Days of this weekday with at least one sale.
    pub active_days: usize,
    pub avg_transactions: f64,
    pub avg_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTraffic {
    pub range: DateRange,
    pub days: Vec<DayStats>,
    /// Sunday = 0 .. Saturday = 6.
    pub weekday_averages: Vec<WeekdayAverage>,
    pub busiest_weekday: Option<usize>,
    pub quietest_weekday: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaffingRecommendation {
    pub weekday: usize,
    pub day_name: &'static str,
    pub avg_hourly_transactions: f64,
    pub peak_hours: Vec<usize>,
    pub peak_hour_transactions: f64,
    pub estimated_staff_needed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyPatterns {
    pub range: DateRange,
    /// Transaction totals indexed `[weekday][hour]`.
    pub transactions: Vec<[u64; 24]>,
    /// Revenue totals indexed `[weekday][hour]`.
    pub revenue: Vec<[f64; 24]>,
    pub staffing: Vec<StaffingRecommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourCapacity {
    pub hour: usize,
    pub avg_transactions: f64,
    /// Display value, capped at 100.
    pub utilization_percent: f64,
    pub raw_utilization_percent: f64,
    pub is_over_capacity: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityReport {
    pub range: DateRange,
    pub max_capacity_per_hour: u32,
    pub active_days: usize,
    pub hours: Vec<HourCapacity>,
    pub over_capacity_hours: Vec<usize>,
}

pub struct TrafficAnalyzer {
    config: TrafficConfig,
}

impl TrafficAnalyzer {
    pub fn new(config: &TrafficConfig) -> Self {
        info!(
            staffing_threshold = config.staffing_threshold_ratio,
            per_staff = config.transactions_per_staff,
            "Traffic analyzer initialized"
        );
        Self {
            config: config.clone(),
        }
    }

    pub fn default_max_capacity(&self) -> u32 {
        self.config.default_max_capacity_per_hour
    }

    pub fn hourly(
        &self,
        transactions: &[CategorizedTransaction],
        range: &DateRange,
        day_of_week: Option<u8>,
    ) -> InsightResult<HourlyTraffic> {
        if let Some(day) = day_of_week {
            validate_weekday(day)?;
        }
        let rows = within(transactions, range)
            .filter(|tx| day_of_week.map_or(true, |d| tx.weekday_index() == usize::from(d)));
        let by_hour = group_by(rows, |tx| tx.hour());

        let hours: Vec<HourBucket> = (0..24)
            .map(|hour| {
                let totals = by_hour
                    .iter()
                    .find(|(h, _)| *h == hour)
                    .map(|(_, group)| Totals::of(group.iter().copied()))
                    .unwrap_or_default();
                HourBucket {
                    hour,
                    revenue: totals.revenue,
                    transaction_count: totals.transactions,
                    unique_customers: totals.unique_customers,
                    avg_transaction_value: totals.avg_transaction_value(),
                }
            })
            .collect();
        let peak_hours = peak_hours(&hours, self.config.peak_hour_count);

        debug!(
            range = %range,
            day_of_week = ?day_of_week,
            peaks = ?peak_hours,
            "Hourly traffic computed"
        );

        Ok(HourlyTraffic {
            range: *range,
            day_of_week,
            hours,
            peak_hours,
        })
    }

    pub fn daily(
        &self,
        transactions: &[CategorizedTransaction],
        range: &DateRange,
    ) -> DailyTraffic {
        let mut days: Vec<DayStats> = group_by(within(transactions, range), |tx| tx.date())
            .into_iter()
            .map(|(date, group)| {
                let weekday = group[0].weekday_index();
                let totals = Totals::of(group);
                DayStats {
                    date,
                    weekday,
                    day_name: DAY_NAMES[weekday],
                    revenue: totals.revenue,
                    transaction_count: totals.transactions,
                    unique_customers: totals.unique_customers,
                }
            })
            .collect();
        days.sort_by_key(|d| d.date);

        let weekday_averages: Vec<WeekdayAverage> = (0..7)
            .map(|weekday| {
                let matching: Vec<&DayStats> =
                    days.iter().filter(|d| d.weekday == weekday).collect();
                let active = matching.len() as f64;
                WeekdayAverage {
                    weekday,
                    day_name: DAY_NAMES[weekday],
                    active_days: matching.len(),
                    avg_transactions: ratio(
                        matching.iter().map(|d| d.transaction_count as f64).sum(),
                        active,
                    ),
                    avg_revenue: ratio(matching.iter().map(|d| d.revenue).sum(), active),
                }
            })
            .collect();

        let active = weekday_averages.iter().filter(|w| w.active_days > 0);
        let busiest_weekday = active
            .clone()
            .fold(None::<&WeekdayAverage>, |best, w| match best {
                Some(b) if b.avg_transactions >= w.avg_transactions => Some(b),
                _ => Some(w),
            })
            .map(|w| w.weekday);
        let quietest_weekday = active
            .fold(None::<&WeekdayAverage>, |best, w| match best {
                Some(b) if b.avg_transactions <= w.avg_transactions => Some(b),
                _ => Some(w),
            })
            .map(|w| w.weekday);

        DailyTraffic {
            range: *range,
            days,
            weekday_averages,
            busiest_weekday,
            quietest_weekday,
        }
    }

    pub fn weekly_patterns(
        &self,
        transactions: &[CategorizedTransaction],
        range: &DateRange,
    ) -> WeeklyPatterns {
        let grid = WeekGrid::build(transactions, range);
        let staffing = (0..7).map(|day| self.staffing_for(&grid, day)).collect();
        WeeklyPatterns {
            range: *range,
            transactions: grid.transactions.to_vec(),
            revenue: grid.revenue.to_vec(),
            staffing,
        }
    }

    pub fn staffing_recommendation(
        &self,
        transactions: &[CategorizedTransaction],
        range: &DateRange,
        day_of_week: u8,
    ) -> InsightResult<StaffingRecommendation> {
        validate_weekday(day_of_week)?;
        let grid = WeekGrid::build(transactions, range);
        Ok(self.staffing_for(&grid, usize::from(day_of_week)))
    }

    /// Hours are flagged when their per-day average exceeds the threshold
    /// ratio times that weekday's mean over active hours.
    fn staffing_for(&self, grid: &WeekGrid, weekday: usize) -> StaffingRecommendation {
        let occurrences = grid.active_days[weekday] as f64;
        let per_day: Vec<f64> = grid.transactions[weekday]
            .iter()
            .map(|count| ratio(*count as f64, occurrences))
            .collect();
        let active_hours: Vec<f64> = per_day.iter().copied().filter(|c| *c > 0.0).collect();
        let avg_hourly = ratio(active_hours.iter().sum(), active_hours.len() as f64);
        let threshold = avg_hourly * self.config.staffing_threshold_ratio;

        let peak_hours: Vec<usize> = per_day
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > threshold && **count > 0.0)
            .map(|(hour, _)| hour)
            .collect();
        let peak_hour_transactions = per_day.iter().copied().fold(0.0, f64::max);
        let per_staff = f64::from(self.config.transactions_per_staff.max(1));

        StaffingRecommendation {
            weekday,
            day_name: DAY_NAMES[weekday],
            avg_hourly_transactions: avg_hourly,
            peak_hours,
            peak_hour_transactions,
            estimated_staff_needed: (peak_hour_transactions / per_staff).ceil() as u32,
        }
    }

    pub fn capacity(
        &self,
        transactions: &[CategorizedTransaction],
        range: &DateRange,
        max_capacity_per_hour: u32,
    ) -> InsightResult<CapacityReport> {
        if max_capacity_per_hour == 0 {
            return Err(InsightError::InvalidParameter {
                name: "maxCapacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        let rows: Vec<&CategorizedTransaction> = within(transactions, range).collect();
        let active_days = rows.iter().map(|tx| tx.date()).collect::<HashSet<_>>().len();

        let mut counts = [0u64; 24];
        for tx in &rows {
            counts[tx.hour()] += 1;
        }

        let hours: Vec<HourCapacity> = counts
            .iter()
            .enumerate()
            .map(|(hour, count)| {
                let avg_transactions = ratio(*count as f64, active_days as f64);
                let raw = ratio(avg_transactions, f64::from(max_capacity_per_hour)) * 100.0;
                HourCapacity {
                    hour,
                    avg_transactions,
                    utilization_percent: raw.min(100.0),
                    raw_utilization_percent: raw,
                    is_over_capacity: raw > 100.0,
                }
            })
            .collect();
        let over_capacity_hours = hours
            .iter()
            .filter(|h| h.is_over_capacity)
            .map(|h| h.hour)
            .collect();

        Ok(CapacityReport {
            range: *range,
            max_capacity_per_hour,
            active_days,
            hours,
            over_capacity_hours,
        })
    }
}

/// Top `n` hours with activity by transaction count; ties go to the
/// earliest hour.
pub fn peak_hours(hours: &[HourBucket], n: usize) -> Vec<usize> {
    let mut ranked: Vec<&HourBucket> = hours.iter().filter(|h| h.transaction_count > 0).collect();
    ranked.sort_by(|a, b| {
        b.transaction_count
            .cmp(&a.transaction_count)
            .then(a.hour.cmp(&b.hour))
    });
    ranked.into_iter().take(n).map(|h| h.hour).collect()
}

fn validate_weekday(day: u8) -> InsightResult<()> {
    if day > 6 {
        return Err(InsightError::InvalidParameter {
            name: "dayOfWeek",
            reason: format!("{day} is outside 0 (Sunday) ..= 6 (Saturday)"),
        });
    }
    Ok(())
}

struct WeekGrid {
    transactions: [[u64; 24]; 7],
    revenue: [[f64; 24]; 7],
    active_days: [usize; 7],
}

impl WeekGrid {
    fn build(transactions: &[CategorizedTransaction], range: &DateRange) -> Self {
        let mut grid = WeekGrid {
            transactions: [[0; 24]; 7],
            revenue: [[0.0; 24]; 7],
            active_days: [0; 7],
        };
        let mut seen_dates = HashSet::new();
        for tx in within(transactions, range) {
            let (day, hour) = (tx.weekday_index(), tx.hour());
            grid.transactions[day][hour] += 1;
            grid.revenue[day][hour] += tx.amount;
            if seen_dates.insert(tx.date()) {
                grid.active_days[day] += 1;
            }
        }
        grid
    }
}
