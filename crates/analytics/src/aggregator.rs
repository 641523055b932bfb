//! Group-by and reduce primitives shared by every analyzer.
//!
//! Groups come back in first-occurrence order of their key, which makes any
//! later stable sort break ties by first-seen order.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use chrono::{Datelike, Days, NaiveDate};
use pos_core::types::{CategorizedTransaction, DateRange};
use serde::Serialize;

/// Groups items by key, preserving first-occurrence order of keys.
pub fn group_by<'a, T, K, I, F>(items: I, mut key_fn: F) -> Vec<(K, Vec<&'a T>)>
where
    T: 'a + ?Sized,
    I: IntoIterator<Item = &'a T>,
    K: Eq + Hash + Clone,
    F: FnMut(&'a T) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, Vec<&'a T>)> = Vec::new();
    for item in items {
        let key = key_fn(item);
        match index.get(&key) {
            Some(&slot) => groups[slot].1.push(item),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![item]));
            }
        }
    }
    groups
}

pub fn sum<'a, T, I, F>(items: I, value_fn: F) -> f64
where
    T: 'a + ?Sized,
    I: IntoIterator<Item = &'a T>,
    F: FnMut(&'a T) -> f64,
{
    items.into_iter().map(value_fn).sum()
}

/// Counts distinct keys. Items whose key is `None` are not counted.
pub fn count_distinct<'a, T, K, I, F>(items: I, key_fn: F) -> usize
where
    T: 'a + ?Sized,
    I: IntoIterator<Item = &'a T>,
    K: Eq + Hash,
    F: FnMut(&'a T) -> Option<K>,
{
    items
        .into_iter()
        .filter_map(key_fn)
        .collect::<HashSet<K>>()
        .len()
}

/// Rows whose date falls inside `range`.
pub fn within<'a>(
    transactions: &'a [CategorizedTransaction],
    range: &'a DateRange,
) -> impl Iterator<Item = &'a CategorizedTransaction> + Clone + 'a {
    transactions.iter().filter(move |tx| range.contains(tx.date()))
}

/// Revenue, volume and reach of a set of transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub revenue: f64,
    pub transactions: usize,
    pub units: u64,
    pub unique_customers: usize,
    pub untracked_transactions: usize,
}

impl Totals {
    pub fn of<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a CategorizedTransaction>,
    {
        let mut totals = Totals::default();
        let mut customers: HashSet<&'a str> = HashSet::new();
        for tx in items {
            totals.revenue += tx.amount;
            totals.transactions += 1;
            totals.units += u64::from(tx.quantity);
            match tx.customer_token.as_deref() {
                Some(token) => {
                    customers.insert(token);
                }
                None => totals.untracked_transactions += 1,
            }
        }
        totals.unique_customers = customers.len();
        totals
    }

    pub fn avg_transaction_value(&self) -> f64 {
        ratio(self.revenue, self.transactions as f64)
    }
}

/// Division that yields 0 instead of NaN or infinity.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let value = numerator / denominator;
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Percent change from `previous` to `current`: 0 when both are zero and
/// 100 when only `previous` is zero.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        if current > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        ratio(current - previous, previous) * 100.0
    }
}

/// Calendar month key as `(year, month)`.
pub fn month_key(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

pub fn next_month((year, month): (i32, u32)) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// Every month touched by `range`, in order.
pub fn months_in(range: &DateRange) -> Vec<(i32, u32)> {
    let last = month_key(range.end);
    let mut current = month_key(range.start);
    let mut months = Vec::new();
    loop {
        months.push(current);
        if current >= last {
            break;
        }
        current = next_month(current);
    }
    months
}

pub fn month_label((year, month): (i32, u32)) -> String {
    format!("{year:04}-{month:02}")
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = u64::from(date.weekday().num_days_from_monday());
    date.checked_sub_days(Days::new(offset)).unwrap_or(date)
}

/// Population mean and sample standard deviation. The deviation is `None`
/// with fewer than two observations.
pub fn mean_and_std_dev(values: &[f64]) -> (f64, Option<f64>) {
    if values.is_empty() {
        return (0.0, None);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, None);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, Some(variance.sqrt()))
}

pub const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];
