use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{InsightError, InsightResult};

/// Opaque loyalty/card token identifying a returning customer.
pub type CustomerToken = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Card => "card",
        }
    }
}

/// A single point-of-sale transaction as produced by the import pipeline.
///
/// `occurred_at` is the store-local wall clock; hour-of-day and weekday
/// buckets are derived from it directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub occurred_at: NaiveDateTime,
    pub amount: f64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub customer_token: Option<CustomerToken>,
    pub product_name: String,
}

fn default_quantity() -> u32 {
    1
}

impl Transaction {
    pub fn new(
        occurred_at: NaiveDateTime,
        amount: f64,
        payment_method: PaymentMethod,
        product_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at,
            amount,
            quantity: default_quantity(),
            payment_method,
            customer_token: None,
            product_name: product_name.into(),
        }
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_customer(mut self, token: impl Into<CustomerToken>) -> Self {
        self.customer_token = Some(token.into());
        self
    }

    pub fn date(&self) -> NaiveDate {
        self.occurred_at.date()
    }

    pub fn hour(&self) -> usize {
        self.occurred_at.hour() as usize
    }

    /// Day of week with Sunday = 0 .. Saturday = 6.
    pub fn weekday_index(&self) -> usize {
        self.occurred_at.weekday().num_days_from_sunday() as usize
    }

    /// Checks the record-level invariants guaranteed by the import boundary.
    pub fn validate(&self) -> InsightResult<()> {
        if !(self.amount.is_finite() && self.amount > 0.0) {
            return Err(InsightError::Source(format!(
                "transaction {} has non-positive amount {}",
                self.id, self.amount
            )));
        }
        if self.quantity == 0 {
            return Err(InsightError::Source(format!(
                "transaction {} has zero quantity",
                self.id
            )));
        }
        if self.payment_method == PaymentMethod::Cash && self.customer_token.is_some() {
            return Err(InsightError::Source(format!(
                "cash transaction {} carries a customer token",
                self.id
            )));
        }
        Ok(())
    }
}

/// Product category assigned by the categorizer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Espresso,
    Latte,
    Americano,
    HotChocolate,
    Tea,
    Specialty,
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Espresso,
        Category::Latte,
        Category::Americano,
        Category::HotChocolate,
        Category::Tea,
        Category::Specialty,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Espresso => "ESPRESSO",
            Self::Latte => "LATTE",
            Self::Americano => "AMERICANO",
            Self::HotChocolate => "HOT_CHOCOLATE",
            Self::Tea => "TEA",
            Self::Specialty => "SPECIALTY",
            Self::Other => "OTHER",
        }
    }

    /// Parses a stored category label. Unknown labels resolve to `Other`.
    pub fn parse_lenient(label: &str) -> Category {
        let normalized = label.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .unwrap_or(Category::Other)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transaction decorated with its category for the lifetime of one
/// analysis pass. Never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategorizedTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub category: Category,
}

impl std::ops::Deref for CategorizedTransaction {
    type Target = Transaction;

    fn deref(&self) -> &Transaction {
        &self.transaction
    }
}

/// Inclusive calendar date range. Construct through [`DateRange::new`] so
/// that `start <= end` always holds; deserialization goes through it too.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = InsightError;

    fn try_from(raw: RawDateRange) -> InsightResult<Self> {
        DateRange::new(raw.start, raw.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> InsightResult<Self> {
        if start > end {
            return Err(InsightError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Range covering a single calendar year.
    pub fn year(year: i32) -> InsightResult<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(|| {
            InsightError::InvalidParameter {
                name: "year",
                reason: format!("{year} is not a representable year"),
            }
        })?;
        let end = NaiveDate::from_ymd_opt(year, 12, 31).ok_or_else(|| {
            InsightError::InvalidParameter {
                name: "year",
                reason: format!("{year} is not a representable year"),
            }
        })?;
        Ok(Self { start, end })
    }

    /// Parses ISO calendar dates (`YYYY-MM-DD`) from request parameters.
    pub fn parse(start: &str, end: &str) -> InsightResult<Self> {
        let parse = |name: &'static str, value: &str| {
            NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
                InsightError::InvalidParameter {
                    name,
                    reason: format!("{value:?} is not an ISO date ({e})"),
                }
            })
        };
        Self::new(parse("startDate", start)?, parse("endDate", end)?)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of calendar days covered, both ends included.
    pub fn num_days(&self) -> u64 {
        (self.end - self.start).num_days() as u64 + 1
    }

    /// The equal-length period ending the day before `start`.
    pub fn preceding(&self) -> Option<DateRange> {
        let end = self.start.checked_sub_days(Days::new(1))?;
        let start = end.checked_sub_days(Days::new(self.num_days() - 1))?;
        Some(DateRange { start, end })
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_reverse_range_rejected() {
        let err = DateRange::new(date(2024, 3, 2), date(2024, 3, 1)).unwrap_err();
        assert_eq!(err.code(), "INVALID_DATE_RANGE");
    }

    #[test]
    fn test_deserialize_checks_order() {
        let range: DateRange =
            serde_json::from_str(r#"{"start":"2024-03-01","end":"2024-03-31"}"#).unwrap();
        assert_eq!(range.num_days(), 31);
        let err = serde_json::from_str::<DateRange>(r#"{"start":"2024-03-31","end":"2024-03-01"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("2024-03-31"));
    }

    #[test]
    fn test_preceding_period_has_equal_length() {
        let range = DateRange::new(date(2024, 3, 1), date(2024, 3, 7)).unwrap();
        let prior = range.preceding().unwrap();
        assert_eq!(prior.start, date(2024, 2, 23));
        assert_eq!(prior.end, date(2024, 2, 29));
        assert_eq!(prior.num_days(), 7);
        assert_eq!(range.dates().count(), 7);
    }

    #[test]
    fn test_unknown_category_label_is_other() {
        assert_eq!(Category::parse_lenient("hot chocolate"), Category::HotChocolate);
        assert_eq!(Category::parse_lenient("latte"), Category::Latte);
        assert_eq!(Category::parse_lenient("smoothie"), Category::Other);
        assert_eq!(Category::parse_lenient(""), Category::Other);
    }

    #[test]
    fn test_cash_with_token_is_invalid() {
        let at = date(2024, 3, 1).and_hms_opt(9, 0, 0).unwrap();
        let tx = Transaction::new(at, 4.5, PaymentMethod::Cash, "Latte").with_customer("abc");
        assert!(tx.validate().is_err());

        let tx = Transaction::new(at, 4.5, PaymentMethod::Card, "Latte").with_customer("abc");
        assert!(tx.validate().is_ok());
        assert_eq!(tx.weekday_index(), 5);
        assert_eq!(tx.hour(), 9);
    }

    #[test]
    fn test_missing_quantity_defaults_to_one() {
        let json = r#"{
            "id": "5f1c8c1e-8f7e-4d0a-9a40-6b7b1f7d2c11",
            "occurred_at": "2024-03-01T10:15:00",
            "amount": 38.7,
            "payment_method": "card",
            "product_name": "Cappuccino"
        }"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.quantity, 1);
        assert!(tx.customer_token.is_none());
    }
}
