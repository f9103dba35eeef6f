//! Terminal and JSON rendering of a published report.

use std::fmt::Write as _;

use clap::ValueEnum;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tally_core::{CategoryBreakdown, Flow, Report, Series};

const BAR_WIDTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Light,
    Dark,
}

impl ColorMode {
    /// (background, border) for chart datasets.
    pub fn dataset_colors(self) -> (&'static str, &'static str) {
        match self {
            ColorMode::Dark => ("#609e79", "#609e79"),
            ColorMode::Light => ("rgba(53, 162, 235, 0.5)", "rgba(53, 162, 235, 1)"),
        }
    }
}

pub fn report_text(report: &Report) -> String {
    let mut out = String::new();
    let title = report.window.map(|w| w.label()).unwrap_or_else(|| "No report".to_string());
    let _ = writeln!(out, "# {title}\n");

    if !report.has_data() {
        out.push_str("No transactions in this period.\n");
        return out;
    }

    for flow in [Flow::Income, Flow::Expense] {
        let series = report.series(flow);
        let _ = writeln!(out, "## {} (total {:.2})\n", flow.label(), series.total());
        out.push_str(&series_bars(series));
        out.push('\n');
        out.push_str(&breakdown_table(report.breakdown(flow)));
        out.push('\n');
    }

    let _ = writeln!(out, "## Balance (net {:.2})\n", report.net());
    for (label, value) in report.balance.labels.iter().zip(&report.balance.values) {
        let _ = writeln!(out, "{label}  {value:>12.2}");
    }
    out
}

fn series_bars(series: &Series) -> String {
    if series.is_empty() {
        return "  (none)\n".to_string();
    }
    let peak = series.peak();
    let mut out = String::new();
    for (label, value) in series.labels.iter().zip(&series.values) {
        let _ = writeln!(out, "{label}  {:<width$} {value:>12.2}", bar(*value, peak), width = BAR_WIDTH);
    }
    out
}

fn bar(value: Decimal, peak: Decimal) -> String {
    if peak <= Decimal::ZERO {
        return String::new();
    }
    let len = (value / peak * Decimal::from(BAR_WIDTH))
        .round()
        .to_usize()
        .unwrap_or(0)
        .clamp(1, BAR_WIDTH);
    "#".repeat(len)
}

fn breakdown_table(breakdown: &CategoryBreakdown) -> String {
    let mut out = String::new();
    for (category, pct) in breakdown.shares() {
        let _ = writeln!(out, "  {category:<24} {pct:>6.2}%");
    }
    out
}

/// Chart-shaped JSON: one bar dataset per flow plus the balance line and
/// category shares.
pub fn report_json(report: &Report, mode: ColorMode) -> Value {
    let (background, border) = mode.dataset_colors();
    let dataset = |label: &str, series: &Series| {
        json!({
            "label": label,
            "labels": series.labels,
            "data": numbers(&series.values),
            "backgroundColor": background,
            "borderColor": border,
        })
    };
    let categories = |b: &CategoryBreakdown| {
        b.slices
            .iter()
            .map(|s| json!({ "category": s.category, "total": s.total.to_f64() }))
            .collect::<Vec<_>>()
    };

    json!({
        "title": report.window.map(|w| w.label()),
        "window": report.window.map(|w| w.to_string()),
        "year": report.window.map(|w| w.year()),
        "month": report.window.and_then(|w| w.month_number()),
        "granularity": report.granularity,
        "datasets": [
            dataset(Flow::Income.label(), &report.income),
            dataset(Flow::Expense.label(), &report.expense),
        ],
        "balance": dataset("Balance", &report.balance),
        "categories": {
            "income": categories(&report.income_by_category),
            "expense": categories(&report.expense_by_category),
        },
    })
}

fn numbers(values: &[Decimal]) -> Vec<f64> {
    values.iter().map(|v| v.to_f64().unwrap_or(0.0)).collect()
}
