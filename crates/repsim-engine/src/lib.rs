//! Replicated multi-version concurrency-control engine.
//!
//! Ten logical sites hold twenty integer variables; even-indexed
//! variables are replicated everywhere, odd-indexed variables live at a
//! single owner site. Transactions read from the snapshot at their start
//! stamp, buffer writes until commit, and pass a four-step commit-time
//! validation: read-only fast path, failure-span abort,
//! first-committer-wins, and serialization-graph cycle detection.
//!
//! The engine consumes already-parsed calls and reports observable
//! results as structured [`Notice`] values; the companion CLI crate owns
//! the textual command surface.

pub mod cell;
pub mod data;
pub mod manager;
pub mod notice;
pub mod site;
pub mod txn;

pub use cell::VersionedCell;
pub use data::DataManager;
pub use manager::TransactionManager;
pub use notice::Notice;
pub use site::{FailureInterval, Site, SiteStatus};
pub use txn::{Transaction, TxnStatus};

pub use repsim_error::EngineError;
pub use repsim_types::{SiteId, Stamp, StampClock, VarId, Version, SITE_COUNT, VAR_COUNT};
