//! Time-bucketed series handed to renderers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One aggregated (key, total) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub key: String,
    pub total: Decimal,
}

/// Index-aligned labels and values, labels strictly increasing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub labels: Vec<String>,
    pub values: Vec<Decimal>,
}

impl Series {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from buckets that are already in key order.
    pub fn from_sorted_buckets(buckets: impl IntoIterator<Item = Bucket>) -> Self {
        let (labels, values) = buckets.into_iter().map(|b| (b.key, b.total)).unzip();
        let series = Self { labels, values };
        debug_assert!(series.is_well_formed(), "bucket keys out of order");
        series
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn buckets(&self) -> impl Iterator<Item = Bucket> + '_ {
        self.labels
            .iter()
            .zip(self.values.iter())
            .map(|(key, total)| Bucket {
                key: key.clone(),
                total: *total,
            })
    }

    pub fn total(&self) -> Decimal {
        self.values.iter().copied().sum()
    }

    /// Largest value, or zero for an empty series. Renderers use it for scaling.
    pub fn peak(&self) -> Decimal {
        self.values
            .iter()
            .copied()
            .max()
            .unwrap_or(Decimal::ZERO)
    }

    /// Same length, strictly increasing labels.
    pub fn is_well_formed(&self) -> bool {
        self.labels.len() == self.values.len() && self.labels.windows(2).all(|w| w[0] < w[1])
    }
}
