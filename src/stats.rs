//! Aggregations over expense and income lists.
//!
//! Everything here is a pure function of its input. Amounts are parsed
//! leniently: a value that does not read as a number counts as zero rather
//! than failing the whole computation.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    category::Category,
    structs::{Expense, Granularity, Income, UserId},
};

/// A dated amount that can be aggregated.
pub trait Entry {
    fn amount(&self) -> Option<&str>;

    fn category(&self) -> Category {
        Category::Otros
    }

    fn date(&self) -> NaiveDate;
}

impl Entry for Expense {
    fn amount(&self) -> Option<&str> {
        Some(&self.amount)
    }

    fn category(&self) -> Category {
        self.category
    }

    fn date(&self) -> NaiveDate {
        self.date
    }
}

impl Entry for Income {
    fn amount(&self) -> Option<&str> {
        Some(&self.amount)
    }

    fn date(&self) -> NaiveDate {
        self.date
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CategoryTotal {
    pub category: Category,
    pub label: &'static str,
    pub color: &'static str,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub count: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PeriodTotal {
    pub period: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub average: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub highest: Decimal,
    pub top_category: Option<CategoryTotal>,
    #[serde(with = "rust_decimal::serde::float")]
    pub weekly_average: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub monthly_average: Decimal,
    pub count: usize,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            total: Decimal::ZERO,
            average: Decimal::ZERO,
            highest: Decimal::ZERO,
            top_category: None,
            weekly_average: Decimal::ZERO,
            monthly_average: Decimal::ZERO,
            count: 0,
        }
    }
}

/// Caller versus partner split of a joint listing.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OwnerComparison {
    #[serde(with = "rust_decimal::serde::float")]
    pub mine: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub partner: Decimal,
}

/// Reads an amount the way a display layer would: full decimal, scientific
/// notation, or the longest numeric prefix. Anything else is zero.
pub fn parse_amount(raw: Option<&str>) -> Decimal {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Decimal::ZERO;
    };
    if let Ok(value) = Decimal::from_str(raw) {
        return value;
    }
    if let Ok(value) = Decimal::from_scientific(raw) {
        return value;
    }
    Decimal::from_str(numeric_prefix(raw)).unwrap_or(Decimal::ZERO)
}

fn numeric_prefix(raw: &str) -> &str {
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (i, c) in raw.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }
    if !seen_digit {
        return "";
    }
    raw[..end].trim_end_matches('.')
}

/// Sums saturate at the `Decimal` bounds, so oversized stored amounts cannot panic.
fn sum_amounts(amounts: impl IntoIterator<Item = Decimal>) -> Decimal {
    amounts
        .into_iter()
        .fold(Decimal::ZERO, |acc, amount| acc.saturating_add(amount))
}

pub fn total_of<E: Entry>(records: &[E]) -> Decimal {
    sum_amounts(records.iter().map(|r| parse_amount(r.amount())))
}

/// Per-category totals in catalog order, omitting categories with nothing spent.
pub fn by_category<E: Entry>(records: &[E]) -> Vec<CategoryTotal> {
    let mut buckets: Vec<CategoryTotal> = Category::ALL
        .into_iter()
        .map(|category| CategoryTotal {
            category,
            label: category.label(),
            color: category.color(),
            total: Decimal::ZERO,
            count: 0,
        })
        .collect();

    for record in records {
        let category = record.category();
        if let Some(bucket) = buckets.iter_mut().find(|b| b.category == category) {
            bucket.total = bucket.total.saturating_add(parse_amount(record.amount()));
            bucket.count += 1;
        }
    }

    buckets.retain(|b| b.total > Decimal::ZERO);
    buckets
}

/// Sunday that starts the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

pub fn period_key(date: NaiveDate, granularity: Granularity) -> String {
    match granularity {
        Granularity::Day => date.format("%Y-%m-%d").to_string(),
        Granularity::Week => week_start(date).format("%Y-%m-%d").to_string(),
        Granularity::Month => format!("{:04}-{:02}", date.year(), date.month()),
        Granularity::Year => format!("{:04}", date.year()),
    }
}

/// Totals per period bucket, ascending by key.
pub fn by_period<E: Entry>(records: &[E], granularity: Granularity) -> Vec<PeriodTotal> {
    let mut grouped: BTreeMap<String, Decimal> = BTreeMap::new();
    for record in records {
        let bucket = grouped
            .entry(period_key(record.date(), granularity))
            .or_insert(Decimal::ZERO);
        *bucket = bucket.saturating_add(parse_amount(record.amount()));
    }
    grouped
        .into_iter()
        .map(|(period, total)| PeriodTotal { period, total })
        .collect()
}

pub fn statistics<E: Entry>(records: &[E]) -> Statistics {
    if records.is_empty() {
        return Statistics::default();
    }

    let count = records.len();
    let total = total_of(records);
    let average = total / Decimal::from(count);
    let highest = records
        .iter()
        .map(|r| parse_amount(r.amount()))
        .max()
        .unwrap_or(Decimal::ZERO);

    // a later category needs a strictly larger total to win
    let top_category = by_category(records)
        .into_iter()
        .fold(None::<CategoryTotal>, |best, candidate| match best {
            Some(b) if candidate.total <= b.total => Some(b),
            _ => Some(candidate),
        });

    let first = records.iter().map(|r| r.date()).min();
    let last = records.iter().map(|r| r.date()).max();
    let day_span = match (first, last) {
        (Some(first), Some(last)) => Decimal::from((last - first).num_days()),
        _ => Decimal::ZERO,
    };
    let weeks = (day_span / Decimal::from(7)).max(Decimal::ONE);
    let months = (day_span / Decimal::from(30)).max(Decimal::ONE);

    Statistics {
        total,
        average,
        highest,
        top_category,
        weekly_average: total / weeks,
        monthly_average: total / months,
        count,
    }
}

/// Inclusive date range filter.
pub fn filter_by_date_range<E: Entry + Clone>(
    records: &[E],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Vec<E> {
    records
        .iter()
        .filter(|r| start.map_or(true, |s| r.date() >= s) && end.map_or(true, |e| r.date() <= e))
        .cloned()
        .collect()
}

pub fn owner_comparison(records: &[Expense], user_id: UserId) -> OwnerComparison {
    let (mine, partner): (Vec<&Expense>, Vec<&Expense>) =
        records.iter().partition(|e| e.user_id == user_id);
    OwnerComparison {
        mine: sum_amounts(mine.iter().map(|e| parse_amount(Entry::amount(*e)))),
        partner: sum_amounts(partner.iter().map(|e| parse_amount(Entry::amount(*e)))),
    }
}
