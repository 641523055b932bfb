//! Customer analytics: RFM scoring, segmentation, retention and cohorts.
//!
//! Only transactions carrying a customer token are attributed to customers.
//! Cash and untokenized card sales are counted separately as untracked.

use std::collections::HashSet;

use chrono::NaiveDate;
use pos_core::error::{InsightError, InsightResult};
use pos_core::types::{CategorizedTransaction, DateRange};
use serde::Serialize;
use tracing::debug;

use crate::aggregator::{group_by, month_key, month_label, months_in, next_month, ratio, within};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Segment {
    Champions,
    Loyal,
    #[serde(rename = "Potential Loyalist")]
    PotentialLoyalist,
    New,
    #[serde(rename = "At Risk")]
    AtRisk,
}

impl Segment {
    pub const ALL: [Segment; 5] = [
        Segment::Champions,
        Segment::Loyal,
        Segment::PotentialLoyalist,
        Segment::New,
        Segment::AtRisk,
    ];

    pub fn from_total(total: u8) -> Segment {
        match total {
            13..=u8::MAX => Segment::Champions,
            10..=12 => Segment::Loyal,
            7..=9 => Segment::PotentialLoyalist,
            5..=6 => Segment::New,
            _ => Segment::AtRisk,
        }
    }
}

pub fn recency_score(days_since_last: i64) -> u8 {
    match days_since_last {
        i64::MIN..=7 => 5,
        8..=14 => 4,
        15..=30 => 3,
        31..=60 => 2,
        _ => 1,
    }
}

pub fn frequency_score(visits: usize) -> u8 {
    match visits {
        20..=usize::MAX => 5,
        10..=19 => 4,
        5..=9 => 3,
        2..=4 => 2,
        _ => 1,
    }
}

pub fn monetary_score(total_spent: f64) -> u8 {
    if total_spent >= 200.0 {
        5
    } else if total_spent >= 100.0 {
        4
    } else if total_spent >= 50.0 {
        3
    } else if total_spent >= 20.0 {
        2
    } else {
        1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RfmScore {
    pub recency: u8,
    pub frequency: u8,
    pub monetary: u8,
    /// Always within 3..=15.
    pub total: u8,
}

impl RfmScore {
    pub fn score(recency_days: i64, visits: usize, total_spent: f64) -> Self {
        let recency = recency_score(recency_days);
        let frequency = frequency_score(visits);
        let monetary = monetary_score(total_spent);
        Self {
            recency,
            frequency,
            monetary,
            total: recency + frequency + monetary,
        }
    }

    pub fn segment(&self) -> Segment {
        Segment::from_total(self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerProfile {
    pub token: String,
    pub visit_count: usize,
    pub total_spent: f64,
    /// First purchase across all available history.
    pub first_seen: NaiveDate,
    /// Last purchase inside the analysed range.
    pub last_seen: NaiveDate,
    /// Days from `last_seen` to the end of the range.
    pub recency_days: i64,
    pub rfm: RfmScore,
    pub segment: Segment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentShare {
    pub segment: Segment,
    pub customers: usize,
    pub revenue: f64,
    pub percent_of_customers: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoyaltyMetrics {
    pub repeat_customer_rate: f64,
    pub avg_visits_per_customer: f64,
    pub avg_customer_value: f64,
    pub avg_days_between_visits: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerInsights {
    pub range: DateRange,
    pub identified_customers: usize,
    /// First-ever purchase falls inside the range.
    pub new_customers: usize,
    /// First-ever purchase predates the range.
    pub returning_customers: usize,
    pub identified_transactions: usize,
    pub untracked_transactions: usize,
    /// Upper bound that treats every untracked sale as a distinct visitor.
    pub estimated_total_customers: usize,
    pub loyalty: LoyaltyMetrics,
    pub segments: Vec<SegmentShare>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthRetention {
    pub month: String,
    pub active_customers: usize,
    pub retained_customers: usize,
    /// Share of this month's customers active again next month, 0..=1.
    pub retention_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionReport {
    pub range: DateRange,
    /// One entry per month whose following month is also inside the range.
    pub months: Vec<MonthRetention>,
    pub average_retention_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortRow {
    pub cohort_month: String,
    pub initial_size: usize,
    /// Index 0 is the acquisition month.
    pub retention_rates: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortReport {
    pub range: DateRange,
    pub cohorts: Vec<CohortRow>,
}

/// Per-customer activity derived from history, in first-purchase order.
struct Activity<'a> {
    token: &'a str,
    first_ever: NaiveDate,
    in_range: Vec<&'a CategorizedTransaction>,
}

impl<'a> Activity<'a> {
    fn collect(history: &'a [CategorizedTransaction], range: &DateRange) -> Vec<Activity<'a>> {
        let identified = history
            .iter()
            .filter(|tx| tx.date() <= range.end)
            .filter_map(|tx| tx.customer_token.as_deref().map(|token| (token, tx)));
        let mut activity = Vec::new();
        for (token, group) in group_by_token(identified) {
            let first_ever = group.iter().map(|tx| tx.date()).min();
            let in_range: Vec<&CategorizedTransaction> = group
                .into_iter()
                .filter(|tx| range.contains(tx.date()))
                .collect();
            if let Some(first_ever) = first_ever {
                activity.push(Activity {
                    token,
                    first_ever,
                    in_range,
                });
            }
        }
        activity
    }

    fn months_active(&self) -> HashSet<(i32, u32)> {
        self.in_range.iter().map(|tx| month_key(tx.date())).collect()
    }
}

fn group_by_token<'a, I>(rows: I) -> Vec<(&'a str, Vec<&'a CategorizedTransaction>)>
where
    I: Iterator<Item = (&'a str, &'a CategorizedTransaction)>,
{
    let pairs: Vec<(&'a str, &'a CategorizedTransaction)> = rows.collect();
    group_by(&pairs, |(token, _)| *token)
        .into_iter()
        .map(|(token, group)| (token, group.into_iter().map(|(_, tx)| *tx).collect()))
        .collect()
}

pub struct CustomerAnalyzer;

impl CustomerAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Profiles of customers active in `range`, highest spend first.
    /// `history` should reach back as far as available so that
    /// `first_seen` reflects the first-ever purchase.
    pub fn profiles(
        &self,
        history: &[CategorizedTransaction],
        range: &DateRange,
    ) -> Vec<CustomerProfile> {
        let mut profiles: Vec<CustomerProfile> = Activity::collect(history, range)
            .iter()
            .filter_map(|a| profile_of(a, range))
            .collect();
        profiles.sort_by(|a, b| b.total_spent.total_cmp(&a.total_spent));
        profiles
    }

    pub fn customer(
        &self,
        history: &[CategorizedTransaction],
        range: &DateRange,
        token: &str,
    ) -> InsightResult<CustomerProfile> {
        let token = token.trim();
        if token.is_empty() {
            return Err(InsightError::MissingRequiredParameter("customer"));
        }
        Activity::collect(history, range)
            .iter()
            .filter(|a| a.token == token)
            .find_map(|a| profile_of(a, range))
            .ok_or_else(|| InsightError::ResourceNotFound {
                kind: "customer",
                id: token.to_string(),
            })
    }

    pub fn insights(
        &self,
        history: &[CategorizedTransaction],
        range: &DateRange,
    ) -> CustomerInsights {
        let activity = Activity::collect(history, range);
        let active: Vec<&Activity> = activity.iter().filter(|a| !a.in_range.is_empty()).collect();
        let new_customers = active.iter().filter(|a| a.first_ever >= range.start).count();
        let identified_transactions: usize = active.iter().map(|a| a.in_range.len()).sum();
        let untracked_transactions = within(history, range)
            .filter(|tx| tx.customer_token.is_none())
            .count();

        let profiles: Vec<CustomerProfile> =
            active.iter().filter_map(|a| profile_of(a, range)).collect();
        let loyalty = loyalty_metrics(&active, &profiles);
        let segments = Self::segment_distribution(&profiles);

        debug!(
            range = %range,
            customers = active.len(),
            new = new_customers,
            untracked = untracked_transactions,
            "Customer insights computed"
        );

        CustomerInsights {
            range: *range,
            identified_customers: active.len(),
            new_customers,
            returning_customers: active.len() - new_customers,
            identified_transactions,
            untracked_transactions,
            estimated_total_customers: active.len() + untracked_transactions,
            loyalty,
            segments,
        }
    }

    /// Counts and revenue per segment, in fixed segment order.
    pub fn segment_distribution(profiles: &[CustomerProfile]) -> Vec<SegmentShare> {
        Segment::ALL
            .into_iter()
            .map(|segment| {
                let members: Vec<&CustomerProfile> =
                    profiles.iter().filter(|p| p.segment == segment).collect();
                SegmentShare {
                    segment,
                    customers: members.len(),
                    revenue: members.iter().map(|p| p.total_spent).sum(),
                    percent_of_customers: ratio(members.len() as f64, profiles.len() as f64)
                        * 100.0,
                }
            })
            .collect()
    }

    pub fn retention(
        &self,
        history: &[CategorizedTransaction],
        range: &DateRange,
    ) -> RetentionReport {
        let activity = Activity::collect(history, range);
        let active_by_customer: Vec<HashSet<(i32, u32)>> =
            activity.iter().map(Activity::months_active).collect();

        let months = months_in(range);
        let retention: Vec<MonthRetention> = months
            .windows(2)
            .map(|pair| {
                let (month, following) = (pair[0], pair[1]);
                let active = active_by_customer.iter().filter(|m| m.contains(&month)).count();
                let retained = active_by_customer
                    .iter()
                    .filter(|m| m.contains(&month) && m.contains(&following))
                    .count();
                MonthRetention {
                    month: month_label(month),
                    active_customers: active,
                    retained_customers: retained,
                    retention_rate: ratio(retained as f64, active as f64),
                }
            })
            .collect();
        let average_retention_rate = ratio(
            retention.iter().map(|m| m.retention_rate).sum(),
            retention.len() as f64,
        );

        RetentionReport {
            range: *range,
            months: retention,
            average_retention_rate,
        }
    }

    /// Groups customers by first-purchase month (inside the range) and tracks
    /// the share active in each following month up to the range end.
    pub fn cohorts(&self, history: &[CategorizedTransaction], range: &DateRange) -> CohortReport {
        let activity = Activity::collect(history, range);
        let acquired = activity.iter().filter(|a| range.contains(a.first_ever));
        let last_month = month_key(range.end);

        let mut cohorts: Vec<CohortRow> = group_by(acquired, |a| month_key(a.first_ever))
            .into_iter()
            .map(|(cohort_month, members)| {
                let member_months: Vec<HashSet<(i32, u32)>> =
                    members.iter().map(|a| a.months_active()).collect();
                let mut retention_rates = Vec::new();
                let mut month = cohort_month;
                loop {
                    let active = member_months.iter().filter(|m| m.contains(&month)).count();
                    retention_rates.push(ratio(active as f64, members.len() as f64));
                    if month >= last_month {
                        break;
                    }
                    month = next_month(month);
                }
                CohortRow {
                    cohort_month: month_label(cohort_month),
                    initial_size: members.len(),
                    retention_rates,
                }
            })
            .collect();
        cohorts.sort_by(|a, b| a.cohort_month.cmp(&b.cohort_month));

        CohortReport {
            range: *range,
            cohorts,
        }
    }
}

impl Default for CustomerAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn profile_of(activity: &Activity<'_>, range: &DateRange) -> Option<CustomerProfile> {
    let last_seen = activity.in_range.iter().map(|tx| tx.date()).max()?;
    let visit_count = activity.in_range.len();
    let total_spent: f64 = activity.in_range.iter().map(|tx| tx.amount).sum();
    let recency_days = (range.end - last_seen).num_days();
    let rfm = RfmScore::score(recency_days, visit_count, total_spent);
    Some(CustomerProfile {
        token: activity.token.to_string(),
        visit_count,
        total_spent,
        first_seen: activity.first_ever,
        last_seen,
        recency_days,
        segment: rfm.segment(),
        rfm,
    })
}

fn loyalty_metrics(active: &[&Activity<'_>], profiles: &[CustomerProfile]) -> LoyaltyMetrics {
    let customers = profiles.len() as f64;
    let repeat = profiles.iter().filter(|p| p.visit_count >= 2).count() as f64;
    let gaps: Vec<f64> = active
        .iter()
        .filter(|a| a.in_range.len() >= 2)
        .filter_map(|a| {
            let first = a.in_range.iter().map(|tx| tx.date()).min()?;
            let last = a.in_range.iter().map(|tx| tx.date()).max()?;
            Some((last - first).num_days() as f64 / (a.in_range.len() - 1) as f64)
        })
        .collect();

    LoyaltyMetrics {
        repeat_customer_rate: ratio(repeat, customers) * 100.0,
        avg_visits_per_customer: ratio(
            profiles.iter().map(|p| p.visit_count as f64).sum(),
            customers,
        ),
        avg_customer_value: ratio(profiles.iter().map(|p| p.total_spent).sum(), customers),
        avg_days_between_visits: ratio(gaps.iter().sum(), gaps.len() as f64),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures::{card, cash, date};

    fn march() -> DateRange {
        DateRange::new(date(2024, 3, 1), date(2024, 3, 31)).unwrap()
    }

    #[test]
    fn test_rfm_example_is_champion() {
        let score = RfmScore::score(5, 12, 220.0);
        assert_eq!((score.recency, score.frequency, score.monetary), (5, 4, 5));
        assert_eq!(score.total, 14);
        assert_eq!(score.segment(), Segment::Champions);
    }

    #[test]
    fn test_score_bucket_edges() {
        assert_eq!(recency_score(7), 5);
        assert_eq!(recency_score(8), 4);
        assert_eq!(recency_score(60), 2);
        assert_eq!(recency_score(61), 1);
        assert_eq!(frequency_score(1), 1);
        assert_eq!(frequency_score(2), 2);
        assert_eq!(frequency_score(20), 5);
        assert_eq!(monetary_score(19.99), 1);
        assert_eq!(monetary_score(20.0), 2);
        assert_eq!(monetary_score(100.0), 4);
    }

    #[test]
    fn test_segment_thresholds_cover_full_score_range() {
        for total in 3..=15u8 {
            let expected = match total {
                13..=15 => Segment::Champions,
                10..=12 => Segment::Loyal,
                7..=9 => Segment::PotentialLoyalist,
                5..=6 => Segment::New,
                _ => Segment::AtRisk,
            };
            assert_eq!(Segment::from_total(total), expected);
        }
        assert_eq!(
            serde_json::to_string(&Segment::PotentialLoyalist).unwrap(),
            "\"Potential Loyalist\""
        );
    }

    #[test]
    fn test_new_versus_returning_uses_full_history() {
        let history = vec![
            card(date(2024, 1, 10), 9, 4.0, "Latte", Some("old")),
            card(date(2024, 3, 5), 9, 4.0, "Latte", Some("old")),
            card(date(2024, 3, 6), 9, 6.0, "Mocha", Some("fresh")),
            card(date(2024, 3, 7), 9, 6.0, "Mocha", None),
            cash(date(2024, 3, 7), 10, 3.0, "Tea"),
            card(date(2024, 4, 2), 9, 6.0, "Mocha", Some("later")),
        ];
        let insights = CustomerAnalyzer::new().insights(&history, &march());
        assert_eq!(insights.identified_customers, 2);
        assert_eq!(insights.new_customers, 1);
        assert_eq!(insights.returning_customers, 1);
        assert_eq!(insights.untracked_transactions, 2);
        assert_eq!(insights.estimated_total_customers, 4);
        assert_eq!(insights.segments.len(), 5);
    }

    #[test]
    fn test_profiles_measure_recency_from_range_end() {
        let history = vec![
            card(date(2024, 3, 1), 9, 30.0, "Latte", Some("a")),
            card(date(2024, 3, 29), 9, 30.0, "Latte", Some("a")),
            card(date(2024, 3, 2), 9, 5.0, "Tea", Some("b")),
        ];
        let profiles = CustomerAnalyzer::new().profiles(&history, &march());
        assert_eq!(profiles[0].token, "a");
        assert_eq!(profiles[0].recency_days, 2);
        assert_eq!(profiles[0].visit_count, 2);
        assert_eq!(profiles[0].rfm.total, 5 + 2 + 3);
        assert_eq!(profiles[0].segment, Segment::Loyal);
        assert_eq!(profiles[1].recency_days, 29);
        assert_eq!(profiles[1].segment, Segment::New);

        let insights = CustomerAnalyzer::new().insights(&history, &march());
        assert!((insights.loyalty.repeat_customer_rate - 50.0).abs() < 1e-9);
        assert!((insights.loyalty.avg_days_between_visits - 28.0).abs() < 1e-9);
    }

    #[test]
    fn test_customer_lookup() {
        let history = vec![card(date(2024, 3, 1), 9, 30.0, "Latte", Some("a"))];
        let analyzer = CustomerAnalyzer::new();
        assert_eq!(analyzer.customer(&history, &march(), "a").unwrap().visit_count, 1);
        assert_eq!(
            analyzer.customer(&history, &march(), "zzz").unwrap_err().code(),
            "RESOURCE_NOT_FOUND"
        );
        assert_eq!(
            analyzer.customer(&history, &march(), "").unwrap_err().code(),
            "MISSING_REQUIRED_PARAMETER"
        );
    }

    #[test]
    fn test_retention_between_consecutive_months() {
        let range = DateRange::new(date(2024, 1, 1), date(2024, 3, 31)).unwrap();
        let history = vec![
            card(date(2024, 1, 3), 9, 4.0, "Latte", Some("a")),
            card(date(2024, 1, 4), 9, 4.0, "Latte", Some("b")),
            card(date(2024, 2, 3), 9, 4.0, "Latte", Some("a")),
        ];
        let report = CustomerAnalyzer::new().retention(&history, &range);
        assert_eq!(report.months.len(), 2);
        assert_eq!(report.months[0].month, "2024-01");
        assert!((report.months[0].retention_rate - 0.5).abs() < 1e-9);
        assert_eq!(report.months[1].active_customers, 1);
        assert_eq!(report.months[1].retention_rate, 0.0);

        let empty = CustomerAnalyzer::new().retention(&[], &range);
        assert!(empty.months.iter().all(|m| m.retention_rate == 0.0));
        assert_eq!(empty.average_retention_rate, 0.0);
    }

    #[test]
    fn test_cohorts_track_following_months() {
        let range = DateRange::new(date(2024, 1, 1), date(2024, 3, 31)).unwrap();
        let history = vec![
            card(date(2023, 12, 1), 9, 4.0, "Latte", Some("veteran")),
            card(date(2024, 1, 3), 9, 4.0, "Latte", Some("veteran")),
            card(date(2024, 1, 3), 9, 4.0, "Latte", Some("a")),
            card(date(2024, 1, 4), 9, 4.0, "Latte", Some("b")),
            card(date(2024, 3, 3), 9, 4.0, "Latte", Some("a")),
            card(date(2024, 2, 9), 9, 4.0, "Latte", Some("c")),
        ];
        let report = CustomerAnalyzer::new().cohorts(&history, &range);
        assert_eq!(report.cohorts.len(), 2);
        let january = &report.cohorts[0];
        assert_eq!(january.cohort_month, "2024-01");
        assert_eq!(january.initial_size, 2);
        assert_eq!(january.retention_rates, vec![1.0, 0.0, 0.5]);
        assert_eq!(report.cohorts[1].retention_rates, vec![1.0, 0.0]);
    }
}
