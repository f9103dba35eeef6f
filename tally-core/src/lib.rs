//! tally-core: transaction, window and series types plus the pure aggregator

pub mod aggregate;
pub mod series;
pub mod time;
pub mod transaction;
pub mod window;

pub use aggregate::{
    aggregate, aggregate_by, balance_trend, category_breakdown, distinct_years, CategoryBreakdown,
    CategorySlice, Granularity, Report,
};
pub use series::{Bucket, Series};
pub use transaction::{Flow, Transaction, UNCATEGORIZED};
pub use window::{ReportingWindow, WindowError, MONTH_NAMES};
