//! tally-ingest: load transaction records from CSV exports.

pub mod parsers;
pub mod types;

pub use parsers::ledger_csv::{parse_ledger_csv, parse_ledger_reader};
pub use types::LedgerRow;
