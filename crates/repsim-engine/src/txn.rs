//! Per-transaction bookkeeping: identity, snapshot stamp, buffered
//! writes, and the serialization predecessors discovered at commit time.
//!
//! Records are never removed from the transaction table; committed and
//! aborted records stay resolvable so later commits can walk dependency
//! edges through them.

use std::collections::{BTreeMap, BTreeSet};

use repsim_types::{SiteId, Stamp, VarId};

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnStatus {
    Active,
    Committed,
    Aborted,
}

/// One user transaction.
#[derive(Debug, Clone)]
pub struct Transaction {
    name: String,
    read_only: bool,
    status: TxnStatus,
    start: Stamp,
    commit: Option<Stamp>,
    read_set: BTreeSet<VarId>,
    write_set: BTreeMap<VarId, i64>,
    sites_written: BTreeSet<SiteId>,
    predecessors: BTreeSet<String>,
    /// Variable of a parked read, while one is outstanding.
    waiting_on: Option<VarId>,
}

impl Transaction {
    /// Bind a name, the read-only flag, and a fresh start stamp.
    #[must_use]
    pub fn new(name: impl Into<String>, read_only: bool, start: Stamp) -> Self {
        Self {
            name: name.into(),
            read_only,
            status: TxnStatus::Active,
            start,
            commit: None,
            read_set: BTreeSet::new(),
            write_set: BTreeMap::new(),
            sites_written: BTreeSet::new(),
            predecessors: BTreeSet::new(),
            waiting_on: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    #[inline]
    #[must_use]
    pub const fn status(&self) -> TxnStatus {
        self.status
    }

    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, TxnStatus::Active)
    }

    /// Whether a parked read is outstanding.
    #[inline]
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        self.waiting_on.is_some()
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> Stamp {
        self.start
    }

    /// Commit stamp; `None` until the transaction commits (and forever
    /// for read-only and aborted transactions).
    #[inline]
    #[must_use]
    pub const fn commit_stamp(&self) -> Option<Stamp> {
        self.commit
    }

    #[must_use]
    pub const fn read_set(&self) -> &BTreeSet<VarId> {
        &self.read_set
    }

    #[must_use]
    pub const fn write_set(&self) -> &BTreeMap<VarId, i64> {
        &self.write_set
    }

    #[must_use]
    pub const fn sites_written(&self) -> &BTreeSet<SiteId> {
        &self.sites_written
    }

    /// Serialization predecessors recorded at validation time.
    #[must_use]
    pub const fn predecessors(&self) -> &BTreeSet<String> {
        &self.predecessors
    }

    pub(crate) fn record_read(&mut self, var: VarId) {
        self.read_set.insert(var);
    }

    /// Buffer a write; a later write to the same variable wins.
    pub(crate) fn buffer_write(&mut self, var: VarId, value: i64) {
        self.write_set.insert(var, value);
    }

    pub(crate) fn add_sites_written(&mut self, sites: impl IntoIterator<Item = SiteId>) {
        self.sites_written.extend(sites);
    }

    pub(crate) fn add_predecessor(&mut self, name: &str) {
        if name != self.name {
            self.predecessors.insert(name.to_owned());
        }
    }

    pub(crate) fn park(&mut self, var: VarId) {
        self.waiting_on = Some(var);
    }

    pub(crate) fn unpark(&mut self) {
        self.waiting_on = None;
    }

    pub(crate) fn mark_committed(&mut self, commit: Option<Stamp>) {
        self.status = TxnStatus::Committed;
        self.commit = commit;
    }

    pub(crate) fn mark_aborted(&mut self) {
        self.status = TxnStatus::Aborted;
        self.waiting_on = None;
    }
}
