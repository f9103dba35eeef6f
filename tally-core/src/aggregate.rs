//! Aggregator: reduces a snapshot of transactions into chart-ready series.
//!
//! Every function here is pure. A snapshot is always reduced from zero, so
//! the result depends only on the set of records, never on their order or
//! on a previous result.
//!
//! Reductions:
//! - `aggregate` / `aggregate_by`: per-day (or per-month) totals for one flow
//! - `balance_trend`: running balance over the same buckets
//! - `category_breakdown`: per-category totals for one flow (pie charts)
//! - `Report`: all of the above for one reporting window

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::series::{Bucket, Series};
use crate::time::{day_key, local_day, month_key};
use crate::transaction::{Flow, Transaction};
use crate::window::ReportingWindow;

/// Bucket width of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Month,
}

impl Granularity {
    /// Daily bars for a month window, monthly bars for a full year.
    pub fn for_window(window: &ReportingWindow) -> Self {
        if window.is_full_year() {
            Granularity::Month
        } else {
            Granularity::Day
        }
    }

    fn truncate(&self, day: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => day,
            Granularity::Month => day.with_day(1).unwrap_or(day),
        }
    }

    fn key(&self, day: NaiveDate) -> String {
        match self {
            Granularity::Day => day_key(day),
            Granularity::Month => month_key(day),
        }
    }
}

/// Per-day totals of one flow, sorted chronologically.
pub fn aggregate(records: &[Transaction], flow: Flow, tz: Tz) -> Series {
    aggregate_by(records, flow, Granularity::Day, tz)
}

pub fn aggregate_by(records: &[Transaction], flow: Flow, granularity: Granularity, tz: Tz) -> Series {
    let mut totals: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    for tx in records {
        let Some(amount) = flow.contribution(tx) else { continue };
        let day = granularity.truncate(local_day(tx.date, tz));
        *totals.entry(day).or_insert(Decimal::ZERO) += amount;
    }
    into_series(totals, granularity)
}

/// Running balance: each bucket holds the cumulative net (income minus
/// expense) from the first bucket up to and including itself.
pub fn balance_trend(records: &[Transaction], granularity: Granularity, tz: Tz) -> Series {
    let mut net: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    for tx in records.iter().filter(|t| !t.amount.is_zero()) {
        let day = granularity.truncate(local_day(tx.date, tz));
        *net.entry(day).or_insert(Decimal::ZERO) += tx.amount;
    }

    let mut running = Decimal::ZERO;
    for total in net.values_mut() {
        running += *total;
        *total = running;
    }
    into_series(net, granularity)
}

fn into_series(totals: BTreeMap<NaiveDate, Decimal>, granularity: Granularity) -> Series {
    Series::from_sorted_buckets(totals.into_iter().map(|(day, total)| Bucket {
        key: granularity.key(day),
        total,
    }))
}

/// One pie slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySlice {
    pub category: String,
    pub total: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryBreakdown {
    /// Sorted by total descending, then category name ascending.
    pub slices: Vec<CategorySlice>,
}

impl CategoryBreakdown {
    pub fn total(&self) -> Decimal {
        self.slices.iter().map(|s| s.total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Share of each slice in percent, rounded to two places.
    pub fn shares(&self) -> Vec<(String, Decimal)> {
        let total = self.total();
        if total.is_zero() {
            return vec![];
        }
        self.slices
            .iter()
            .map(|s| {
                let pct = (s.total * Decimal::ONE_HUNDRED / total).round_dp(2);
                (s.category.clone(), pct)
            })
            .collect()
    }
}

pub fn category_breakdown(records: &[Transaction], flow: Flow) -> CategoryBreakdown {
    let mut totals: BTreeMap<&str, Decimal> = BTreeMap::new();
    for tx in records {
        let Some(amount) = flow.contribution(tx) else { continue };
        *totals.entry(tx.category_label()).or_insert(Decimal::ZERO) += amount;
    }

    let mut slices: Vec<CategorySlice> = totals
        .into_iter()
        .map(|(category, total)| CategorySlice {
            category: category.to_string(),
            total,
        })
        .collect();
    // BTreeMap already yields names ascending; a stable sort keeps that for ties.
    slices.sort_by(|a, b| b.total.cmp(&a.total));
    CategoryBreakdown { slices }
}

/// Everything a report view renders for one window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub window: Option<ReportingWindow>,
    pub granularity: Option<Granularity>,
    pub income: Series,
    pub expense: Series,
    pub balance: Series,
    pub income_by_category: CategoryBreakdown,
    pub expense_by_category: CategoryBreakdown,
}

impl Report {
    pub fn for_window(records: &[Transaction], window: &ReportingWindow, tz: Tz) -> Self {
        let granularity = Granularity::for_window(window);
        Self {
            window: Some(*window),
            granularity: Some(granularity),
            income: aggregate_by(records, Flow::Income, granularity, tz),
            expense: aggregate_by(records, Flow::Expense, granularity, tz),
            balance: balance_trend(records, granularity, tz),
            income_by_category: category_breakdown(records, Flow::Income),
            expense_by_category: category_breakdown(records, Flow::Expense),
        }
    }

    pub fn series(&self, flow: Flow) -> &Series {
        match flow {
            Flow::Income => &self.income,
            Flow::Expense => &self.expense,
        }
    }

    pub fn breakdown(&self, flow: Flow) -> &CategoryBreakdown {
        match flow {
            Flow::Income => &self.income_by_category,
            Flow::Expense => &self.expense_by_category,
        }
    }

    /// Income minus expense over the whole window.
    pub fn net(&self) -> Decimal {
        self.income.total() - self.expense.total()
    }

    pub fn has_data(&self) -> bool {
        !(self.income.is_empty() && self.expense.is_empty())
    }
}

/// Distinct calendar years present in `records`, ascending.
pub fn distinct_years(records: &[Transaction], tz: Tz) -> Vec<i32> {
    let years: std::collections::BTreeSet<i32> =
        records.iter().map(|t| local_day(t.date, tz).year()).collect();
    years.into_iter().collect()
}
