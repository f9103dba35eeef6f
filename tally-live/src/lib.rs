//! tally-live: live query binding, publishing and year discovery over a
//! subscribable transaction store

pub mod binder;
pub mod dashboard;
pub mod error;
pub mod memory;
pub mod publisher;
pub mod selector;
pub mod session;
pub mod source;
pub mod years;

pub use binder::{BindOutcome, LiveQueryBinder, Reducer};
pub use dashboard::Dashboard;
pub use error::{ErrorReporter, LiveError, LogReporter, RecordingReporter};
pub use memory::MemorySource;
pub use publisher::{Feed, Published, Publisher};
pub use selector::WindowSelector;
pub use session::Session;
pub use source::{SnapshotCallback, SourceEvent, SourceSubscription, TransactionFilter, TransactionSource};
pub use years::discover_years;
