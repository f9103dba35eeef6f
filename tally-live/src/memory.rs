//! In-process live transaction store.
//!
//! Keeps records keyed by id and pushes the full matching set to every
//! affected subscriber after each change, the same delivery model a hosted
//! document store offers. The CLI seeds it from CSV; tests use it to drive
//! the pipeline.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use anyhow::{bail, Result};
use tally_core::Transaction;

use crate::error::lock;
use crate::source::{SnapshotCallback, SourceEvent, SourceSubscription, TransactionFilter, TransactionSource};

#[derive(Clone, Default)]
pub struct MemorySource {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    records: Mutex<BTreeMap<String, Transaction>>,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
    fail_next_read: Mutex<Option<String>>,
    fail_next_subscribe: Mutex<Option<String>>,
}

struct Subscriber {
    filter: TransactionFilter,
    callback: Arc<Mutex<SnapshotCallback>>,
}

type Delivery = (Arc<Mutex<SnapshotCallback>>, SourceEvent);

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = Transaction>) -> Self {
        let source = Self::new();
        {
            let mut map = lock(&source.inner.records);
            for tx in records {
                map.insert(tx.id.clone(), tx);
            }
        }
        source
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.records).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner.records).is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }

    /// Insert or update a record and notify subscribers that match either
    /// the old or the new version.
    pub fn upsert(&self, tx: Transaction) {
        let deliveries = {
            let mut records = lock(&self.inner.records);
            let old = records.insert(tx.id.clone(), tx.clone());
            let subscribers = lock(&self.inner.subscribers);
            affected(&records, &subscribers, |f| {
                f.matches(&tx) || old.as_ref().is_some_and(|o| f.matches(o))
            })
        };
        deliver(deliveries);
    }

    pub fn remove(&self, id: &str) -> Option<Transaction> {
        let (removed, deliveries) = {
            let mut records = lock(&self.inner.records);
            let Some(old) = records.remove(id) else { return None };
            let subscribers = lock(&self.inner.subscribers);
            let deliveries = affected(&records, &subscribers, |f| f.matches(&old));
            (old, deliveries)
        };
        deliver(deliveries);
        Some(removed)
    }

    /// Swap in a whole new record set. Only subscribers whose matching set
    /// actually changed are notified.
    pub fn replace_all(&self, next: impl IntoIterator<Item = Transaction>) {
        let deliveries = {
            let mut records = lock(&self.inner.records);
            let next: BTreeMap<String, Transaction> =
                next.into_iter().map(|tx| (tx.id.clone(), tx)).collect();
            let subscribers = lock(&self.inner.subscribers);
            let mut out: Vec<Delivery> = Vec::new();
            for sub in subscribers.values() {
                let before = matching(&records, &sub.filter);
                let after = matching(&next, &sub.filter);
                if before != after {
                    out.push((sub.callback.clone(), SourceEvent::Snapshot(after)));
                }
            }
            *records = next;
            out
        };
        deliver(deliveries);
    }

    /// Push a query error to every live subscriber, as a dropped connection would.
    pub fn fail_with(&self, message: impl Into<String>) {
        let message = message.into();
        let deliveries: Vec<Delivery> = lock(&self.inner.subscribers)
            .values()
            .map(|s| (s.callback.clone(), SourceEvent::Error(message.clone())))
            .collect();
        deliver(deliveries);
    }

    pub fn fail_next_read(&self, message: impl Into<String>) {
        *lock(&self.inner.fail_next_read) = Some(message.into());
    }

    pub fn fail_next_subscribe(&self, message: impl Into<String>) {
        *lock(&self.inner.fail_next_subscribe) = Some(message.into());
    }
}

fn matching(records: &BTreeMap<String, Transaction>, filter: &TransactionFilter) -> Vec<Transaction> {
    records.values().filter(|t| filter.matches(t)).cloned().collect()
}

fn affected(
    records: &BTreeMap<String, Transaction>,
    subscribers: &HashMap<u64, Subscriber>,
    touched: impl Fn(&TransactionFilter) -> bool,
) -> Vec<Delivery> {
    subscribers
        .values()
        .filter(|s| touched(&s.filter))
        .map(|s| (s.callback.clone(), SourceEvent::Snapshot(matching(records, &s.filter))))
        .collect()
}

// Runs outside the store locks so callbacks may read the store again.
fn deliver(deliveries: Vec<Delivery>) {
    for (callback, event) in deliveries {
        let mut cb = lock(&callback);
        (*cb)(event);
    }
}

impl TransactionSource for MemorySource {
    async fn subscribe(&self, filter: TransactionFilter, callback: SnapshotCallback) -> Result<SourceSubscription> {
        if let Some(message) = lock(&self.inner.fail_next_subscribe).take() {
            bail!("{message}");
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let callback = Arc::new(Mutex::new(callback));
        let initial = {
            let records = lock(&self.inner.records);
            let snapshot = matching(&records, &filter);
            lock(&self.inner.subscribers).insert(
                id,
                Subscriber {
                    filter,
                    callback: callback.clone(),
                },
            );
            snapshot
        };
        deliver(vec![(callback, SourceEvent::Snapshot(initial))]);

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        Ok(SourceSubscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner.subscribers).remove(&id);
            }
        }))
    }

    async fn read_all(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        if let Some(message) = lock(&self.inner.fail_next_read).take() {
            bail!("{message}");
        }
        Ok(matching(&lock(&self.inner.records), filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn tx(id: &str, user: &str, day: u32) -> Transaction {
        let date = Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap();
        Transaction::new(id, user, dec!(10), date, "")
    }

    fn recorder() -> (Arc<Mutex<Vec<SourceEvent>>>, SnapshotCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, Box::new(move |ev| sink.lock().unwrap().push(ev)))
    }

    fn snapshot_ids(ev: &SourceEvent) -> Vec<String> {
        match ev {
            SourceEvent::Snapshot(records) => records.iter().map(|t| t.id.clone()).collect(),
            SourceEvent::Error(_) => vec![],
        }
    }

    #[tokio::test]
    async fn delivers_initial_snapshot_then_changes() {
        let source = MemorySource::with_records(vec![tx("a", "u1", 1), tx("b", "u2", 1)]);
        let (seen, cb) = recorder();
        let _sub = source.subscribe(TransactionFilter::user("u1"), cb).await.unwrap();

        source.upsert(tx("c", "u1", 2));
        source.upsert(tx("d", "u2", 2));
        source.remove("a");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(snapshot_ids(&seen[0]), vec!["a"]);
        assert_eq!(snapshot_ids(&seen[1]), vec!["a", "c"]);
        assert_eq!(snapshot_ids(&seen[2]), vec!["c"]);
    }

    #[tokio::test]
    async fn moving_a_record_out_of_range_notifies() {
        let source = MemorySource::with_records(vec![tx("a", "u1", 1)]);
        let (seen, cb) = recorder();
        let _sub = source.subscribe(TransactionFilter::user("u1"), cb).await.unwrap();

        source.upsert(tx("a", "u2", 1));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(snapshot_ids(&seen[1]).is_empty());
    }

    #[tokio::test]
    async fn cancel_stops_delivery() {
        let source = MemorySource::new();
        let (seen, cb) = recorder();
        let sub = source.subscribe(TransactionFilter::user("u1"), cb).await.unwrap();
        assert_eq!(source.subscriber_count(), 1);

        sub.cancel();
        assert_eq!(source.subscriber_count(), 0);
        source.upsert(tx("a", "u1", 1));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replace_all_skips_unchanged_subscribers() {
        let source = MemorySource::with_records(vec![tx("a", "u1", 1), tx("b", "u2", 1)]);
        let (seen, cb) = recorder();
        let _sub = source.subscribe(TransactionFilter::user("u1"), cb).await.unwrap();

        source.replace_all(vec![tx("a", "u1", 1), tx("b", "u2", 1), tx("c", "u2", 3)]);
        assert_eq!(seen.lock().unwrap().len(), 1);

        source.replace_all(vec![tx("b", "u2", 1)]);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(snapshot_ids(&seen[1]).is_empty());
    }

    #[tokio::test]
    async fn armed_failures_fire_once() {
        let source = MemorySource::with_records(vec![tx("a", "u1", 1)]);
        source.fail_next_read("offline");
        let filter = TransactionFilter::user("u1");
        assert!(source.read_all(&filter).await.is_err());
        assert_eq!(source.read_all(&filter).await.unwrap().len(), 1);

        source.fail_next_subscribe("permission denied");
        let (_, cb) = recorder();
        assert!(source.subscribe(filter.clone(), cb).await.is_err());
        assert_eq!(source.subscriber_count(), 0);
    }
}
