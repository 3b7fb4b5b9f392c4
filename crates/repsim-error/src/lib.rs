//! Error surface of the repsim engine.
//!
//! Every operation the engine can reject fails with one [`EngineError`]
//! variant. Structured variants carry the offending variable, site, or
//! transaction so callers can render precise diagnostics; classification
//! helpers tell the transaction manager how each failure is resolved
//! (abort the transaction, park the read, or report and ignore).

use repsim_types::{SiteId, VarId};
use thiserror::Error;

/// Primary error type for engine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    // === Request validation ===
    /// The variable name is not of the form `x1..x20`.
    #[error("invalid variable name: {name}")]
    InvalidVariable { name: String },

    /// The site id is outside `1..=10`.
    #[error("invalid site id: {id}")]
    InvalidSite { id: u64 },

    /// The named transaction was never begun.
    #[error("transaction {name} not found")]
    UnknownTransaction { name: String },

    /// `begin` was issued twice for the same name.
    #[error("transaction {name} already exists")]
    DuplicateTransaction { name: String },

    /// The transaction has already committed or aborted.
    #[error("transaction {name} is not active")]
    NotActive { name: String },

    /// The transaction is parked on a pending read and accepts no
    /// further operations until the read resolves.
    #[error("transaction {name} is blocked on a pending read")]
    Blocked { name: String },

    /// A read-only transaction attempted a write.
    #[error("read-only transaction {name} cannot perform writes")]
    ReadOnlyWrite { name: String },

    // === Read routing ===
    /// The single owner of an odd-indexed variable is down.
    #[error("site {site} holding {var} is down")]
    SiteDown { site: SiteId, var: VarId },

    /// The site does not host the requested variable.
    #[error("site {site} does not host {var}")]
    NotHosted { site: SiteId, var: VarId },

    /// The replicated copy at this site is stale after recovery and has
    /// not yet been refreshed by a commit.
    #[error("{var} is not yet readable at site {site}")]
    Unavailable { site: SiteId, var: VarId },

    /// No site holds an unbroken version history for the variable at the
    /// requested snapshot stamp.
    #[error("no site holds a valid copy of {var}")]
    NoValidCopy { var: VarId },

    /// A valid copy exists but no hosting site can currently serve it;
    /// the read is parked until a site recovers.
    #[error("no live copy of {var}; read must wait")]
    MustWait { var: VarId },

    // === Commit validation ===
    /// Another transaction committed a write to the variable after this
    /// transaction's snapshot (first-committer-wins).
    #[error("write-write conflict on {var}")]
    WriteConflict { var: VarId },

    /// A site this transaction wrote to failed during its lifetime.
    #[error("failure of site {site}")]
    SiteFailure { site: SiteId },

    /// Committing would close a cycle in the serialization graph.
    #[error("cycle in dependency graph")]
    DependencyCycle,
}

impl EngineError {
    /// Whether this failure aborts the transaction it was raised for.
    ///
    /// Everything except a parked read and the report-and-ignore request
    /// errors forces an abort.
    #[must_use]
    pub const fn aborts_transaction(&self) -> bool {
        match self {
            Self::InvalidVariable { .. }
            | Self::SiteDown { .. }
            | Self::NotHosted { .. }
            | Self::Unavailable { .. }
            | Self::NoValidCopy { .. }
            | Self::ReadOnlyWrite { .. }
            | Self::WriteConflict { .. }
            | Self::SiteFailure { .. }
            | Self::DependencyCycle => true,
            Self::InvalidSite { .. }
            | Self::UnknownTransaction { .. }
            | Self::DuplicateTransaction { .. }
            | Self::NotActive { .. }
            | Self::Blocked { .. }
            | Self::MustWait { .. } => false,
        }
    }

    /// Whether this failure parks the operation instead of resolving it.
    #[must_use]
    pub const fn is_wait(&self) -> bool {
        matches!(self, Self::MustWait { .. })
    }

    /// Whether retrying the enclosing transaction from scratch could
    /// succeed (the conflict is transient).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SiteDown { .. }
                | Self::Unavailable { .. }
                | Self::NoValidCopy { .. }
                | Self::MustWait { .. }
                | Self::WriteConflict { .. }
                | Self::SiteFailure { .. }
                | Self::DependencyCycle
        )
    }
}
