//! Window Selector: the current reporting period and the years offered for it.

use tally_core::{ReportingWindow, WindowError};
use tokio::sync::watch;

pub struct WindowSelector {
    window: watch::Sender<ReportingWindow>,
    years: watch::Sender<Vec<i32>>,
}

impl WindowSelector {
    pub fn new(initial: ReportingWindow) -> Self {
        Self {
            window: watch::Sender::new(initial),
            years: watch::Sender::new(Vec::new()),
        }
    }

    pub fn current(&self) -> ReportingWindow {
        *self.window.borrow()
    }

    /// Validate and select a period. `month` is zero-based.
    ///
    /// Invalid input leaves the selection untouched and notifies nobody.
    /// Selecting the period that is already current is accepted but does
    /// not notify either.
    pub fn set_period(&self, year: i32, month: Option<u32>) -> Result<ReportingWindow, WindowError> {
        let next = ReportingWindow::new(year, month)?;
        let changed = self.window.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            log::debug!("window set to {next}");
        }
        Ok(next)
    }

    /// Keep the year, change (or drop) the month.
    pub fn set_month(&self, month: Option<u32>) -> Result<ReportingWindow, WindowError> {
        self.set_period(self.current().year(), month)
    }

    /// Change notifications for the selected window.
    pub fn watch(&self) -> watch::Receiver<ReportingWindow> {
        self.window.subscribe()
    }

    /// Years offered in the period picker, ascending.
    pub fn available_years(&self) -> Vec<i32> {
        self.years.borrow().clone()
    }

    pub fn set_available_years(&self, mut years: Vec<i32>) {
        years.sort_unstable();
        years.dedup();
        self.years.send_replace(years);
    }

    pub fn clear_available_years(&self) {
        self.years.send_replace(Vec::new());
    }

    pub fn watch_years(&self) -> watch::Receiver<Vec<i32>> {
        self.years.subscribe()
    }
}
