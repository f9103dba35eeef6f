//! Year Discovery: one-shot scan of a user's whole history for the year picker.

use chrono_tz::Tz;
use tally_core::distinct_years;

use crate::error::{ErrorReporter, LiveError};
use crate::source::{TransactionFilter, TransactionSource};

/// Distinct years (ascending) in which `user_id` has transactions.
///
/// Not live: call it again when the report view mounts for a user. A read
/// failure is reported and yields no years. With no signed-in user the scan
/// is skipped.
pub async fn discover_years<S: TransactionSource>(
    source: &S,
    user_id: Option<&str>,
    tz: Tz,
    reporter: &dyn ErrorReporter,
) -> Vec<i32> {
    let Some(user_id) = user_id else {
        log::debug!("year scan skipped: no user");
        return Vec::new();
    };

    match source.read_all(&TransactionFilter::user(user_id)).await {
        Ok(records) => {
            let years = distinct_years(&records, tz);
            log::debug!("year scan for {user_id}: {} record(s), years {years:?}", records.len());
            years
        }
        Err(err) => {
            reporter.report(&LiveError::scan(user_id, &err));
            Vec::new()
        }
    }
}
