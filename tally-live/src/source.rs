//! Contract with the external transaction store.
//!
//! The store is opaque: all the pipeline needs is a filtered live query that
//! pushes the full matching set on every change, and a one-shot read.

use std::future::Future;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tally_core::Transaction;

/// `user_id == user_id AND start <= date <= end`. No range means all dates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionFilter {
    pub user_id: String,
    pub range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl TransactionFilter {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            range: None,
        }
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.range = Some((start, end));
        self
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        if tx.user_id != self.user_id {
            return false;
        }
        match self.range {
            Some((start, end)) => start <= tx.date && tx.date <= end,
            None => true,
        }
    }
}

/// What a live query delivers.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// The entire current matching set.
    Snapshot(Vec<Transaction>),
    /// The query failed or was interrupted. It may recover and deliver more
    /// snapshots later.
    Error(String),
}

pub type SnapshotCallback = Box<dyn FnMut(SourceEvent) + Send + 'static>;

/// Handle for an open live query. Dropping it cancels the query.
pub struct SourceSubscription {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl SourceSubscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stop the query. Best-effort: a panicking store teardown is logged and swallowed.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        let Some(cancel) = self.cancel.take() else { return };
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(cancel)).is_err() {
            log::warn!("transaction source panicked while unsubscribing");
        }
    }
}

impl Drop for SourceSubscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl std::fmt::Debug for SourceSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSubscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

pub trait TransactionSource: Send + Sync + 'static {
    /// Open a live query. The callback receives the initial snapshot and
    /// then one snapshot per change, in the order the store emits them.
    fn subscribe(
        &self,
        filter: TransactionFilter,
        callback: SnapshotCallback,
    ) -> impl Future<Output = Result<SourceSubscription>> + Send;

    /// One-shot read of every record matching `filter`.
    fn read_all(&self, filter: &TransactionFilter) -> impl Future<Output = Result<Vec<Transaction>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn filter_is_inclusive_on_both_ends() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap();
        let f = TransactionFilter::user("u1").between(start, end);

        assert!(f.matches(&Transaction::new("a", "u1", dec!(1), start, "")));
        assert!(f.matches(&Transaction::new("b", "u1", dec!(1), end, "")));
        assert!(!f.matches(&Transaction::new("c", "u2", dec!(1), start, "")));
        let after = end + chrono::Duration::seconds(1);
        assert!(!f.matches(&Transaction::new("d", "u1", dec!(1), after, "")));
    }

    #[test]
    fn subscription_cancels_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let sub = SourceSubscription::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        sub.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let c = calls.clone();
        drop(SourceSubscription::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_teardown_is_swallowed() {
        let sub = SourceSubscription::new(|| panic!("store already closed"));
        sub.cancel();
    }
}
