//! Dashboard wiring: session and window changes drive year discovery and
//! the live binder; the binder drives the report publisher.

use std::future::Future;
use std::sync::Arc;

use chrono_tz::Tz;
use tally_core::{Report, ReportingWindow};
use tokio::sync::watch;

use crate::binder::{BindOutcome, LiveQueryBinder};
use crate::error::{ErrorReporter, LiveError, LogReporter};
use crate::publisher::Publisher;
use crate::selector::WindowSelector;
use crate::source::TransactionSource;
use crate::years::discover_years;

pub struct Dashboard<S: TransactionSource> {
    source: Arc<S>,
    binder: LiveQueryBinder<S, Report>,
    selector: Arc<WindowSelector>,
    reporter: Arc<dyn ErrorReporter>,
    tz: Tz,
}

impl<S: TransactionSource> Dashboard<S> {
    pub fn new(source: Arc<S>, selector: Arc<WindowSelector>, tz: Tz) -> Self {
        let reporter: Arc<dyn ErrorReporter> = Arc::new(LogReporter);
        let binder = LiveQueryBinder::reports(source.clone(), Publisher::new(), tz).with_reporter(reporter.clone());
        Self {
            source,
            binder,
            selector,
            reporter,
            tz,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.binder = self.binder.with_reporter(reporter.clone());
        self.reporter = reporter;
        self
    }

    pub fn reports(&self) -> &Publisher<Report> {
        self.binder.publisher()
    }

    pub fn selector(&self) -> &Arc<WindowSelector> {
        &self.selector
    }

    pub fn binder(&self) -> &LiveQueryBinder<S, Report> {
        &self.binder
    }

    /// Report view mounted (or the user changed): refresh the year list and
    /// bind the current window. With no user, years and report are cleared.
    pub async fn mount(&self, user_id: Option<&str>) -> Result<BindOutcome, LiveError> {
        match user_id {
            Some(_) => {
                let years = discover_years(self.source.as_ref(), user_id, self.tz, self.reporter.as_ref()).await;
                self.selector.set_available_years(years);
            }
            None => self.selector.clear_available_years(),
        }
        self.binder.bind(user_id, self.selector.current()).await
    }

    /// Select a new window. Rejected input is reported and changes nothing.
    pub fn select(&self, year: i32, month: Option<u32>) -> Result<ReportingWindow, LiveError> {
        self.selector.set_period(year, month).map_err(|e| self.rejected(e))
    }

    fn rejected(&self, e: tally_core::WindowError) -> LiveError {
        let err = LiveError::from(e);
        self.reporter.report(&err);
        err
    }

    /// Keep the selected year and switch to `month` (zero-based), or to the
    /// whole year with `None`.
    pub fn select_month(&self, month: Option<u32>) -> Result<ReportingWindow, LiveError> {
        self.selector.set_month(month).map_err(|e| self.rejected(e))
    }

    /// Drive the pipeline until the session provider goes away or `shutdown`
    /// resolves. The open query is closed on exit; the last report stays
    /// published.
    pub async fn run(
        &self,
        mut session: watch::Receiver<Option<String>>,
        shutdown: impl Future<Output = ()>,
    ) {
        tokio::pin!(shutdown);
        let mut windows = self.selector.watch();

        let mut user = session.borrow_and_update().clone();
        windows.borrow_and_update();
        self.settle(self.mount(user.as_deref()).await);

        loop {
            tokio::select! {
                changed = session.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = session.borrow_and_update().clone();
                    if next != user {
                        user = next;
                        self.settle(self.mount(user.as_deref()).await);
                    }
                }
                changed = windows.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let window = *windows.borrow_and_update();
                    self.settle(self.binder.bind(user.as_deref(), window).await);
                }
                _ = &mut shutdown => break,
            }
        }

        self.binder.close();
        log::debug!("dashboard stopped");
    }

    // Bind failures were already reported by the binder.
    fn settle(&self, outcome: Result<BindOutcome, LiveError>) {
        match outcome {
            Ok(o) => log::debug!("dashboard bind: {o:?}"),
            Err(e) => log::debug!("dashboard bind failed, keeping last report: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordingReporter;
    use crate::memory::MemorySource;

    fn dashboard(reporter: Arc<RecordingReporter>) -> Dashboard<MemorySource> {
        let window = ReportingWindow::new(2024, Some(2)).unwrap();
        Dashboard::new(Arc::new(MemorySource::new()), Arc::new(WindowSelector::new(window)), Tz::UTC)
            .with_reporter(reporter)
    }

    #[test]
    fn select_month_keeps_the_year() {
        let reporter = Arc::new(RecordingReporter::new());
        let d = dashboard(reporter.clone());

        let w = d.select_month(Some(11)).unwrap();
        assert_eq!(w, ReportingWindow::new(2024, Some(11)).unwrap());
        assert_eq!(d.selector().current(), w);

        assert_eq!(d.select_month(None).unwrap(), ReportingWindow::year_only(2024).unwrap());
        assert!(reporter.errors().is_empty());
    }

    #[test]
    fn bad_month_is_reported_and_ignored() {
        let reporter = Arc::new(RecordingReporter::new());
        let d = dashboard(reporter.clone());

        assert!(d.select_month(Some(12)).is_err());
        assert_eq!(d.selector().current(), ReportingWindow::new(2024, Some(2)).unwrap());
        assert_eq!(
            reporter.errors(),
            vec![LiveError::InvalidWindow(tally_core::WindowError::InvalidMonth(12))]
        );
    }
}
