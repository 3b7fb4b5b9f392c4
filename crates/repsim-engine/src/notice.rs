//! Observable engine output.
//!
//! Every engine operation returns the ordered list of [`Notice`] values
//! it produced; the CLI renders them line by line. Keeping the output
//! structured lets tests assert on events instead of scraping text.

use std::fmt;

use repsim_error::EngineError;
use repsim_types::{SiteId, VarId};

/// One line of observable simulator output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A transaction was begun.
    Started { txn: String, read_only: bool },
    /// A read resolved to a value (either immediately or when a parked
    /// read was resumed by a recovery).
    Value { var: VarId, value: i64 },
    /// A write was buffered into the transaction's write set.
    Buffered { txn: String, var: VarId, value: i64 },
    /// The transaction committed.
    Committed { txn: String, read_only: bool },
    /// Why the following abort happened.
    AbortCause { txn: String, cause: EngineError },
    /// The transaction aborted.
    Aborted { txn: String },
    /// A malformed or misdirected request was reported and ignored
    /// without affecting any transaction.
    Rejected { cause: EngineError },
    /// A site went down.
    SiteFailed { site: SiteId },
    /// A site came back as recovering.
    SiteRecovered { site: SiteId },
    /// `dump()` section header for one site.
    DumpHeader { site: SiteId },
    /// `dump()` body for a down site.
    DumpSiteDown { site: SiteId },
    /// One modified variable in a `dump()` listing.
    DumpValue { site: SiteId, var: VarId, value: i64 },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { txn, read_only } => {
                let suffix = if *read_only { " (Read-Only)" } else { "" };
                write!(f, "Transaction {txn} started{suffix}.")
            }
            Self::Value { var, value } => write!(f, "{var}: {value}"),
            Self::Buffered { txn, var, value } => {
                write!(f, "Write of {value} to {var} buffered for transaction {txn}")
            }
            Self::Committed { txn, read_only } => {
                let suffix = if *read_only { " (Read-Only)" } else { "" };
                write!(f, "{txn} committed{suffix}.")
            }
            Self::AbortCause { txn, cause } => match cause {
                EngineError::SiteFailure { site } => {
                    write!(f, "{txn} aborts due to failure of site {site}")
                }
                EngineError::WriteConflict { var } => {
                    write!(f, "Write-write conflict detected on {var} for transaction {txn}")
                }
                EngineError::DependencyCycle => {
                    write!(f, "{txn} aborts due to cycle in dependency graph")
                }
                EngineError::ReadOnlyWrite { .. } => {
                    write!(f, "Read-only transaction {txn} cannot perform writes.")
                }
                EngineError::InvalidVariable { name } => {
                    write!(f, "Invalid variable name: {name}")
                }
                EngineError::Blocked { .. } => {
                    write!(f, "{txn} aborts with a waiting read outstanding")
                }
                other => write!(f, "Read failed for transaction {txn}: {other}"),
            },
            Self::Aborted { txn } => write!(f, "Transaction {txn} aborted."),
            Self::Rejected { cause } => match cause {
                EngineError::UnknownTransaction { name } => {
                    write!(f, "Transaction {name} not found.")
                }
                EngineError::NotActive { name } => {
                    write!(f, "Transaction {name} is not active.")
                }
                EngineError::DuplicateTransaction { name } => {
                    write!(f, "Transaction {name} already exists.")
                }
                EngineError::Blocked { name } => {
                    write!(f, "Transaction {name} is waiting on a read.")
                }
                EngineError::InvalidSite { id } => write!(f, "Invalid site id: {id}"),
                other => write!(f, "{other}"),
            },
            Self::SiteFailed { site } => write!(f, "Site {site} failed."),
            Self::SiteRecovered { site } => write!(f, "Site {site} recovered."),
            Self::DumpHeader { site } => write!(f, "=== Site {site} ==="),
            Self::DumpSiteDown { .. } => write!(f, "This site is down."),
            Self::DumpValue { site, var, value } => {
                write!(f, "{var}: {value} at site {site}")
            }
        }
    }
}
