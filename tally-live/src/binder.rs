//! Live Query Binder: keeps exactly one live query open for the current
//! (user, window) pair and feeds its snapshots through a reducer into a
//! [`Publisher`].
//!
//! Every bind bumps a generation counter. Callbacks carry the generation
//! they were opened with and are dropped once it is no longer current, so
//! a late snapshot from a superseded window can never overwrite the data of
//! the window that replaced it. The generation check and the publish happen
//! under the same lock that a rebind takes to bump the counter.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use chrono_tz::Tz;
use tally_core::{aggregate, Flow, Report, ReportingWindow, Series, Transaction};

use crate::error::{lock, ErrorReporter, LiveError, LogReporter};
use crate::publisher::Publisher;
use crate::source::{SnapshotCallback, SourceEvent, SourceSubscription, TransactionFilter, TransactionSource};

pub type Reducer<T> = Arc<dyn Fn(&[Transaction], &ReportingWindow) -> T + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// A live query is open for this generation.
    Bound { generation: u64 },
    /// No user: nothing was opened and the published value was cleared.
    Cleared { generation: u64 },
    /// Another bind started while this one was opening; the query it opened
    /// has already been closed again.
    Superseded { generation: u64 },
}

impl BindOutcome {
    pub fn generation(&self) -> u64 {
        match *self {
            BindOutcome::Bound { generation }
            | BindOutcome::Cleared { generation }
            | BindOutcome::Superseded { generation } => generation,
        }
    }
}

struct Binding {
    generation: u64,
    user_id: String,
    window: ReportingWindow,
    subscription: SourceSubscription,
}

pub struct LiveQueryBinder<S, T> {
    source: Arc<S>,
    publisher: Publisher<T>,
    reducer: Reducer<T>,
    reporter: Arc<dyn ErrorReporter>,
    tz: Tz,
    gate: Arc<Mutex<u64>>,
    active: Mutex<Option<Binding>>,
}

impl<S: TransactionSource> LiveQueryBinder<S, Report> {
    /// Binder publishing a full [`Report`] per snapshot.
    pub fn reports(source: Arc<S>, publisher: Publisher<Report>, tz: Tz) -> Self {
        Self::new(source, publisher, move |records, window| {
            Report::for_window(records, window, tz)
        })
        .with_timezone(tz)
    }
}

impl<S: TransactionSource> LiveQueryBinder<S, Series> {
    /// Binder publishing the per-day series of one flow.
    pub fn daily(source: Arc<S>, publisher: Publisher<Series>, flow: Flow, tz: Tz) -> Self {
        Self::new(source, publisher, move |records, _| aggregate(records, flow, tz)).with_timezone(tz)
    }
}

impl<S, T> LiveQueryBinder<S, T>
where
    S: TransactionSource,
    T: Default + Send + Sync + 'static,
{
    pub fn new(
        source: Arc<S>,
        publisher: Publisher<T>,
        reducer: impl Fn(&[Transaction], &ReportingWindow) -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            source,
            publisher,
            reducer: Arc::new(reducer),
            reporter: Arc::new(LogReporter),
            tz: Tz::UTC,
            gate: Arc::new(Mutex::new(0)),
            active: Mutex::new(None),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Timezone used to turn a window into instant bounds.
    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.tz = tz;
        self
    }

    pub fn publisher(&self) -> &Publisher<T> {
        &self.publisher
    }

    pub fn generation(&self) -> u64 {
        *lock(&self.gate)
    }

    /// User and window of the open query, if any.
    pub fn binding(&self) -> Option<(String, ReportingWindow)> {
        lock(&self.active)
            .as_ref()
            .map(|b| (b.user_id.clone(), b.window))
    }

    /// Close the previous query and open one for `user_id` within `window`.
    ///
    /// With no user, nothing is opened and the published value is cleared.
    /// If the store refuses the query, the error is reported and the last
    /// published value is left in place.
    pub async fn bind(&self, user_id: Option<&str>, window: ReportingWindow) -> Result<BindOutcome, LiveError> {
        let generation = self.advance();

        let Some(user_id) = user_id else {
            self.clear_if_current(generation);
            log::debug!("bind #{generation}: signed out, cleared");
            return Ok(BindOutcome::Cleared { generation });
        };

        let (start, end) = window.bounds(self.tz);
        let filter = TransactionFilter::user(user_id).between(start, end);
        let callback = self.callback(generation, window);

        let subscription = match self.source.subscribe(filter, callback).await {
            Ok(s) => s,
            Err(err) => {
                let err = LiveError::subscription(generation, &err);
                self.reporter.report(&err);
                return Err(err);
            }
        };

        let mut active = lock(&self.active);
        if *lock(&self.gate) != generation {
            drop(active);
            subscription.cancel();
            log::debug!("bind #{generation}: superseded while opening");
            return Ok(BindOutcome::Superseded { generation });
        }
        *active = Some(Binding {
            generation,
            user_id: user_id.to_string(),
            window,
            subscription,
        });
        log::debug!("bind #{generation}: {user_id} {window}");
        Ok(BindOutcome::Bound { generation })
    }

    /// Close the open query and clear the published value (sign-out).
    pub fn unbind(&self) -> u64 {
        let generation = self.advance();
        self.clear_if_current(generation);
        generation
    }

    /// Close the open query but keep the published value.
    pub fn close(&self) {
        self.advance();
    }

    /// Invalidate every outstanding callback and tear down the open query.
    fn advance(&self) -> u64 {
        let generation = {
            let mut current = lock(&self.gate);
            *current += 1;
            *current
        };
        let previous = lock(&self.active).take();
        if let Some(old) = previous {
            log::debug!("closing query #{} ({} {})", old.generation, old.user_id, old.window);
            old.subscription.cancel();
        }
        generation
    }

    fn clear_if_current(&self, generation: u64) {
        let current = lock(&self.gate);
        if *current == generation {
            self.publisher.clear();
        }
    }

    fn callback(&self, generation: u64, window: ReportingWindow) -> SnapshotCallback {
        let gate = self.gate.clone();
        let publisher = self.publisher.clone();
        let reducer = self.reducer.clone();
        let reporter = self.reporter.clone();

        Box::new(move |event| match event {
            SourceEvent::Snapshot(records) => {
                if *lock(&gate) != generation {
                    log::debug!("dropping stale snapshot from query #{generation}");
                    return;
                }
                let value = match panic::catch_unwind(AssertUnwindSafe(|| reducer(&records, &window))) {
                    Ok(value) => value,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        if *lock(&gate) == generation {
                            reporter.report(&LiveError::Aggregate { generation, message });
                        }
                        return;
                    }
                };
                let current = lock(&gate);
                if *current != generation {
                    log::debug!("dropping stale snapshot from query #{generation}");
                    return;
                }
                publisher.publish(value);
            }
            SourceEvent::Error(message) => {
                if *lock(&gate) != generation {
                    log::debug!("dropping stale error from query #{generation}: {message}");
                    return;
                }
                reporter.report(&LiveError::Subscription { generation, message });
            }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "reducer panicked".to_string())
}

impl<S, T> Drop for LiveQueryBinder<S, T> {
    fn drop(&mut self) {
        *lock(&self.gate) += 1;
        if let Some(binding) = lock(&self.active).take() {
            binding.subscription.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordingReporter;
    use crate::memory::MemorySource;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn tx(id: &str, amount: Decimal, y: i32, m: u32, d: u32) -> Transaction {
        let date = Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap();
        Transaction::new(id, "u1", amount, date, "")
    }

    fn march() -> ReportingWindow {
        ReportingWindow::new(2024, Some(2)).unwrap()
    }

    #[tokio::test]
    async fn bind_publishes_initial_snapshot() {
        let source = Arc::new(MemorySource::with_records(vec![
            tx("a", dec!(100), 2024, 3, 1),
            tx("b", dec!(50), 2024, 3, 1),
            tx("c", dec!(20), 2024, 3, 2),
            tx("d", dec!(999), 2024, 4, 1),
        ]));
        let binder = LiveQueryBinder::daily(source, Publisher::new(), Flow::Income, Tz::UTC);

        let outcome = binder.bind(Some("u1"), march()).await.unwrap();
        assert_eq!(outcome, BindOutcome::Bound { generation: 1 });

        let s = binder.publisher().latest();
        assert_eq!(s.labels, vec!["2024-03-01", "2024-03-02"]);
        assert_eq!(s.values, vec![dec!(150), dec!(20)]);
    }

    #[tokio::test]
    async fn changes_republish_full_aggregation() {
        let source = Arc::new(MemorySource::with_records(vec![tx("a", dec!(10), 2024, 3, 1)]));
        let binder = LiveQueryBinder::daily(source.clone(), Publisher::new(), Flow::Income, Tz::UTC);
        binder.bind(Some("u1"), march()).await.unwrap();

        source.upsert(tx("b", dec!(5), 2024, 3, 1));
        assert_eq!(binder.publisher().latest().values, vec![dec!(15)]);

        source.upsert(tx("a", dec!(1), 2024, 3, 1));
        assert_eq!(binder.publisher().latest().values, vec![dec!(6)]);

        source.remove("b");
        assert_eq!(binder.publisher().latest().values, vec![dec!(1)]);
    }

    #[tokio::test]
    async fn rebinding_keeps_one_subscription() {
        let source = Arc::new(MemorySource::new());
        let binder = LiveQueryBinder::daily(source.clone(), Publisher::new(), Flow::Income, Tz::UTC);

        binder.bind(Some("u1"), march()).await.unwrap();
        binder.bind(Some("u1"), ReportingWindow::new(2024, Some(3)).unwrap()).await.unwrap();
        binder.bind(Some("u2"), march()).await.unwrap();

        assert_eq!(source.subscriber_count(), 1);
        assert_eq!(binder.generation(), 3);
        assert_eq!(binder.binding(), Some(("u2".to_string(), march())));
    }

    #[tokio::test]
    async fn signed_out_bind_clears_without_subscribing() {
        let source = Arc::new(MemorySource::with_records(vec![tx("a", dec!(10), 2024, 3, 1)]));
        let binder = LiveQueryBinder::daily(source.clone(), Publisher::new(), Flow::Income, Tz::UTC);
        binder.bind(Some("u1"), march()).await.unwrap();
        assert!(!binder.publisher().latest().is_empty());

        let outcome = binder.bind(None, march()).await.unwrap();
        assert!(matches!(outcome, BindOutcome::Cleared { .. }));
        assert!(binder.publisher().latest().is_empty());
        assert_eq!(source.subscriber_count(), 0);
        assert_eq!(binder.binding(), None);
    }

    #[tokio::test]
    async fn failed_subscribe_reports_and_keeps_last_value() {
        let source = Arc::new(MemorySource::with_records(vec![tx("a", dec!(10), 2024, 3, 1)]));
        let reporter = Arc::new(RecordingReporter::new());
        let binder = LiveQueryBinder::daily(source.clone(), Publisher::new(), Flow::Income, Tz::UTC)
            .with_reporter(reporter.clone());
        binder.bind(Some("u1"), march()).await.unwrap();

        source.fail_next_subscribe("unavailable");
        let err = binder.bind(Some("u1"), march()).await.unwrap_err();
        assert!(matches!(err, LiveError::Subscription { generation: 2, .. }));
        assert_eq!(reporter.errors(), vec![err]);
        assert_eq!(binder.publisher().latest().values, vec![dec!(10)]);
    }

    #[tokio::test]
    async fn overflowing_day_is_reported_and_keeps_last_value() {
        let huge = dec!(50000000000000000000000000000);
        let source = Arc::new(MemorySource::with_records(vec![tx("a", huge, 2024, 3, 1)]));
        let reporter = Arc::new(RecordingReporter::new());
        let binder = LiveQueryBinder::daily(source.clone(), Publisher::new(), Flow::Income, Tz::UTC)
            .with_reporter(reporter.clone());
        binder.bind(Some("u1"), march()).await.unwrap();
        let version = binder.publisher().version();

        source.upsert(tx("b", huge, 2024, 3, 1));
        assert!(matches!(reporter.last(), Some(LiveError::Aggregate { generation: 1, .. })));
        assert_eq!(binder.publisher().version(), version);
        assert_eq!(binder.publisher().latest().values, vec![huge]);

        source.upsert(tx("b", dec!(1), 2024, 3, 1));
        assert_eq!(binder.publisher().latest().values, vec![huge + dec!(1)]);
        assert_eq!(reporter.errors().len(), 1);
    }

    #[tokio::test]
    async fn unbind_and_drop_stop_delivery() {
        let source = Arc::new(MemorySource::new());
        let publisher = Publisher::new();
        let binder = LiveQueryBinder::daily(source.clone(), publisher.clone(), Flow::Income, Tz::UTC);
        binder.bind(Some("u1"), march()).await.unwrap();
        binder.unbind();
        assert_eq!(source.subscriber_count(), 0);

        binder.bind(Some("u1"), march()).await.unwrap();
        drop(binder);
        assert_eq!(source.subscriber_count(), 0);
        let before = publisher.version();
        source.upsert(tx("a", dec!(10), 2024, 3, 1));
        assert_eq!(publisher.version(), before);
    }
}
