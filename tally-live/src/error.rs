//! Error taxonomy for the live pipeline and the hook that reports it.

use std::sync::{Mutex, MutexGuard};

use tally_core::WindowError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiveError {
    /// The live query failed to open or was interrupted.
    #[error("subscription #{generation} failed: {message}")]
    Subscription { generation: u64, message: String },

    /// Year discovery could not read the user's transactions.
    #[error("year scan for {user_id} failed: {message}")]
    Scan { user_id: String, message: String },

    /// The reducer could not fold a snapshot, e.g. a bucket sum overflowed.
    #[error("aggregation for query #{generation} failed: {message}")]
    Aggregate { generation: u64, message: String },

    #[error(transparent)]
    InvalidWindow(#[from] WindowError),
}

impl LiveError {
    pub(crate) fn subscription(generation: u64, err: &anyhow::Error) -> Self {
        LiveError::Subscription {
            generation,
            message: format!("{err:#}"),
        }
    }

    pub(crate) fn scan(user_id: &str, err: &anyhow::Error) -> Self {
        LiveError::Scan {
            user_id: user_id.to_string(),
            message: format!("{err:#}"),
        }
    }
}

/// Where boundary components send failures they have already recovered from.
///
/// Implementations must not block or panic; the pipeline calls this from
/// subscription callbacks.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, err: &LiveError);
}

/// Forwards every report to `log::error!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, err: &LiveError) {
        log::error!("{err}");
    }
}

/// Keeps reported errors in memory, for views that show the latest problem.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    errors: Mutex<Vec<LiveError>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<LiveError> {
        lock(&self.errors).clone()
    }

    pub fn last(&self) -> Option<LiveError> {
        lock(&self.errors).last().cloned()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, err: &LiveError) {
        log::warn!("{err}");
        lock(&self.errors).push(err.clone());
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
