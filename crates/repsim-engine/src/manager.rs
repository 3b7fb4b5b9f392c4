//! The serialization engine: operation dispatch, commit-time validation,
//! and the global read/write tables.
//!
//! Commands are processed strictly in arrival order. Reads resolve
//! against the issuing transaction's start-stamp snapshot; writes are
//! buffered and applied only at commit. The commit validator runs four
//! ordered checks (read-only fast path, failure-span abort,
//! first-committer-wins, serialization-cycle detection) and the first
//! failure wins.

use std::collections::{BTreeMap, BTreeSet};

use repsim_error::EngineError;
use repsim_types::{SiteId, Stamp, StampClock, VarId};

use crate::data::DataManager;
use crate::notice::Notice;
use crate::txn::{Transaction, TxnStatus};

/// A read that found a conceptually valid copy with no live site to
/// serve it; replayed on every recovery.
#[derive(Debug, Clone)]
struct ParkedRead {
    txn: String,
    var: VarId,
    snapshot: Stamp,
}

/// Ordered engine over the ten-site data manager.
///
/// Owns every transaction record for the lifetime of the process;
/// committed and aborted records stay in the table so later commits can
/// resolve dependency edges through them.
#[derive(Debug)]
pub struct TransactionManager {
    clock: StampClock,
    data: DataManager,
    txns: BTreeMap<String, Transaction>,
    /// Every transaction that ever read each variable.
    readers: BTreeMap<VarId, BTreeSet<String>>,
    /// Every transaction that committed a write to each variable.
    writers: BTreeMap<VarId, BTreeSet<String>>,
    /// Most recent committer per variable.
    last_writer: BTreeMap<VarId, String>,
    parked: Vec<ParkedRead>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    /// A fresh engine: clock at zero, all sites up, initial state
    /// committed at logical time zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: StampClock::new(),
            data: DataManager::new(),
            txns: BTreeMap::new(),
            readers: BTreeMap::new(),
            writers: BTreeMap::new(),
            last_writer: BTreeMap::new(),
            parked: Vec::new(),
        }
    }

    /// The underlying data manager (sites and version stores).
    #[must_use]
    pub const fn data(&self) -> &DataManager {
        &self.data
    }

    /// Look up a transaction record by name.
    #[must_use]
    pub fn transaction(&self, name: &str) -> Option<&Transaction> {
        self.txns.get(name)
    }

    /// Number of reads currently parked waiting for a recovery.
    #[must_use]
    pub fn parked_reads(&self) -> usize {
        self.parked.len()
    }

    /// Snapshot of the parked-read queue in arrival order:
    /// `(transaction, variable, snapshot stamp)`.
    #[must_use]
    pub fn parked_entries(&self) -> Vec<(String, VarId, Stamp)> {
        self.parked
            .iter()
            .map(|entry| (entry.txn.clone(), entry.var, entry.snapshot))
            .collect()
    }

    /// The most recently issued logical stamp.
    #[must_use]
    pub const fn now(&self) -> Stamp {
        self.clock.now()
    }

    // -----------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------

    /// Start a transaction. Rejected if the name is already taken.
    pub fn begin(&mut self, name: &str, read_only: bool) -> Vec<Notice> {
        if self.txns.contains_key(name) {
            return vec![Notice::Rejected {
                cause: EngineError::DuplicateTransaction {
                    name: name.to_owned(),
                },
            }];
        }
        let start = self.clock.tick();
        self.txns
            .insert(name.to_owned(), Transaction::new(name, read_only, start));
        tracing::info!(txn = %name, start = %start, read_only, "transaction begun");
        vec![Notice::Started {
            txn: name.to_owned(),
            read_only,
        }]
    }

    /// Read a variable within a transaction's snapshot.
    ///
    /// A read that must wait produces no notice; its value line is
    /// emitted by the recovery that resumes it.
    pub fn read(&mut self, name: &str, var_name: &str) -> Vec<Notice> {
        if let Some(cause) = self.check_operable(name) {
            return vec![Notice::Rejected { cause }];
        }
        let Ok(var) = var_name.parse::<VarId>() else {
            return self.abort_with(
                name,
                EngineError::InvalidVariable {
                    name: var_name.to_owned(),
                },
            );
        };
        let start = self.txns[name].start();
        match self.data.read(var, start) {
            Ok(value) => {
                let txn = self.txns.get_mut(name).expect("checked above");
                txn.record_read(var);
                self.readers.entry(var).or_default().insert(name.to_owned());
                tracing::debug!(txn = %name, var = %var, at = %start, value, "read served");
                vec![Notice::Value { var, value }]
            }
            Err(cause) if cause.is_wait() => {
                let txn = self.txns.get_mut(name).expect("checked above");
                txn.park(var);
                self.parked.push(ParkedRead {
                    txn: name.to_owned(),
                    var,
                    snapshot: start,
                });
                tracing::debug!(txn = %name, var = %var, at = %start, "read parked until recovery");
                Vec::new()
            }
            Err(cause) => self.abort_with(name, cause),
        }
    }

    /// Buffer a write into a transaction's write set.
    pub fn write(&mut self, name: &str, var_name: &str, value: i64) -> Vec<Notice> {
        if let Some(cause) = self.check_operable(name) {
            return vec![Notice::Rejected { cause }];
        }
        if self.txns[name].is_read_only() {
            return self.abort_with(
                name,
                EngineError::ReadOnlyWrite {
                    name: name.to_owned(),
                },
            );
        }
        let Ok(var) = var_name.parse::<VarId>() else {
            return self.abort_with(
                name,
                EngineError::InvalidVariable {
                    name: var_name.to_owned(),
                },
            );
        };

        // A single-copy write always touches its owner, down or not, so
        // the validator can catch an owner that was unavailable. A
        // replicated write touches the hosts reachable right now; with
        // every host down it touches all of them, which guarantees the
        // validator aborts a write that reached no live copy.
        let touched: Vec<SiteId> = match var.owner_site() {
            Some(owner) => vec![owner],
            None => {
                let hosts = self.data.available_hosts(var);
                if hosts.is_empty() {
                    var.host_sites()
                } else {
                    hosts
                }
            }
        };
        let txn = self.txns.get_mut(name).expect("checked above");
        txn.add_sites_written(touched);
        txn.buffer_write(var, value);
        tracing::debug!(txn = %name, var = %var, value, "write buffered");
        vec![Notice::Buffered {
            txn: name.to_owned(),
            var,
            value,
        }]
    }

    /// Finish a transaction: validate, then commit or abort.
    pub fn end(&mut self, name: &str) -> Vec<Notice> {
        match self.txns.get(name) {
            None => {
                return vec![Notice::Rejected {
                    cause: EngineError::UnknownTransaction {
                        name: name.to_owned(),
                    },
                }]
            }
            Some(txn) if !txn.is_active() => {
                return vec![Notice::Rejected {
                    cause: EngineError::NotActive {
                        name: name.to_owned(),
                    },
                }]
            }
            Some(txn) if txn.is_blocked() => {
                // The parked read never produced a value, so the
                // transaction never observed a complete snapshot.
                return self.abort_with(
                    name,
                    EngineError::Blocked {
                        name: name.to_owned(),
                    },
                );
            }
            Some(_) => {}
        }
        self.validate_and_commit(name)
    }

    /// Mark a site down.
    pub fn fail_site(&mut self, id: u64) -> Vec<Notice> {
        let Some(site) = Self::parse_site(id) else {
            return vec![Notice::Rejected {
                cause: EngineError::InvalidSite { id },
            }];
        };
        let now = self.clock.tick();
        self.data.fail_site(site, now);
        vec![Notice::SiteFailed { site }]
    }

    /// Bring a site back, then replay parked reads that the recovered
    /// site can now serve.
    pub fn recover_site(&mut self, id: u64) -> Vec<Notice> {
        let Some(site) = Self::parse_site(id) else {
            return vec![Notice::Rejected {
                cause: EngineError::InvalidSite { id },
            }];
        };
        let now = self.clock.tick();
        self.data.recover_site(site, now);
        let mut notices = vec![Notice::SiteRecovered { site }];
        self.resume_parked(&mut notices);
        notices
    }

    /// Per-site listing of variables whose committed value differs from
    /// the initial one.
    #[must_use]
    pub fn dump(&self) -> Vec<Notice> {
        let mut notices = Vec::new();
        for site in self.data.sites() {
            let id = site.id();
            notices.push(Notice::DumpHeader { site: id });
            if !site.is_available() {
                notices.push(Notice::DumpSiteDown { site: id });
                continue;
            }
            for (var, value) in site.modified_variables() {
                notices.push(Notice::DumpValue {
                    site: id,
                    var,
                    value,
                });
            }
        }
        notices
    }

    // -----------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------

    /// Ordered commit-time checks; the first failure aborts.
    fn validate_and_commit(&mut self, name: &str) -> Vec<Notice> {
        let txn = &self.txns[name];
        let start = txn.start();
        let read_only = txn.is_read_only();
        let sites_written: Vec<SiteId> = txn.sites_written().iter().copied().collect();
        let write_vars: Vec<VarId> = txn.write_set().keys().copied().collect();
        let read_vars: Vec<VarId> = txn.read_set().iter().copied().collect();

        // Read-only fast path: every read already came from the start
        // snapshot, so nothing can invalidate it.
        if read_only {
            self.txns
                .get_mut(name)
                .expect("record exists")
                .mark_committed(None);
            tracing::info!(txn = %name, "read-only transaction committed");
            return vec![Notice::Committed {
                txn: name.to_owned(),
                read_only: true,
            }];
        }

        // Failure-span abort: every site this transaction wrote to must
        // have stayed up from its start through now.
        for site in sites_written {
            if self.data.site(site).failed_during(start) {
                tracing::warn!(txn = %name, site = site.get(), "abort: site failed during lifetime");
                return self.abort_with(name, EngineError::SiteFailure { site });
            }
        }

        // First-committer-wins over the buffered write set.
        for var in &write_vars {
            if self.data.had_committed_write_since(*var, start) {
                tracing::warn!(txn = %name, var = %var, "abort: first-committer-wins");
                return self.abort_with(name, EngineError::WriteConflict { var: *var });
            }
        }

        // Serialization edges into the committing transaction: w -> T
        // for committed writers of what T read, r -> T for readers of
        // what T writes, last committer of each written variable -> T.
        let mut predecessors: BTreeSet<String> = BTreeSet::new();
        for var in &read_vars {
            if let Some(writers) = self.writers.get(var) {
                predecessors.extend(writers.iter().filter(|w| w.as_str() != name).cloned());
            }
        }
        for var in &write_vars {
            if let Some(readers) = self.readers.get(var) {
                predecessors.extend(readers.iter().filter(|r| r.as_str() != name).cloned());
            }
            if let Some(last) = self.last_writer.get(var) {
                if last != name {
                    predecessors.insert(last.clone());
                }
            }
        }
        {
            let txn = self.txns.get_mut(name).expect("record exists");
            for pred in &predecessors {
                txn.add_predecessor(pred);
            }
        }

        if self.closes_cycle(name) {
            tracing::warn!(txn = %name, "abort: commit would close a serialization cycle");
            return self.abort_with(name, EngineError::DependencyCycle);
        }

        // Commit: stamp, apply buffered writes, update global tables.
        let commit = self.clock.tick();
        let txn = self.txns.get_mut(name).expect("record exists");
        txn.mark_committed(Some(commit));
        let writes = txn.write_set().clone();
        self.data.apply_writes(&writes, commit);
        for var in write_vars {
            self.writers
                .entry(var)
                .or_default()
                .insert(name.to_owned());
            self.last_writer.insert(var, name.to_owned());
        }
        tracing::info!(txn = %name, commit = %commit, "transaction committed");
        vec![Notice::Committed {
            txn: name.to_owned(),
            read_only: false,
        }]
    }

    /// Whether the committing transaction is reachable from itself along
    /// stored predecessor edges. Aborted records never hold a
    /// serialization position, so the walk does not pass through them.
    fn closes_cycle(&self, root: &str) -> bool {
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut stack: Vec<&str> = self.txns[root]
            .predecessors()
            .iter()
            .map(String::as_str)
            .collect();
        while let Some(current) = stack.pop() {
            if current == root {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            let Some(txn) = self.txns.get(current) else {
                continue;
            };
            if txn.status() == TxnStatus::Aborted {
                continue;
            }
            stack.extend(txn.predecessors().iter().map(String::as_str));
        }
        false
    }

    // -----------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------

    /// Why an operation on this transaction must be reported and
    /// ignored, if any reason applies.
    fn check_operable(&self, name: &str) -> Option<EngineError> {
        match self.txns.get(name) {
            None => Some(EngineError::UnknownTransaction {
                name: name.to_owned(),
            }),
            Some(txn) if !txn.is_active() => Some(EngineError::NotActive {
                name: name.to_owned(),
            }),
            Some(txn) if txn.is_blocked() => Some(EngineError::Blocked {
                name: name.to_owned(),
            }),
            Some(_) => None,
        }
    }

    /// Abort a transaction, discarding buffered writes and any parked
    /// read, and report the cause.
    fn abort_with(&mut self, name: &str, cause: EngineError) -> Vec<Notice> {
        self.txns
            .get_mut(name)
            .expect("abort targets a known transaction")
            .mark_aborted();
        self.parked.retain(|entry| entry.txn != name);
        tracing::warn!(txn = %name, %cause, "transaction aborted");
        vec![
            Notice::AbortCause {
                txn: name.to_owned(),
                cause,
            },
            Notice::Aborted {
                txn: name.to_owned(),
            },
        ]
    }

    /// Replay parked reads after a recovery, emitting values for every
    /// read the cluster can now serve.
    fn resume_parked(&mut self, notices: &mut Vec<Notice>) {
        let mut remaining = Vec::new();
        for entry in std::mem::take(&mut self.parked) {
            let operable = self
                .txns
                .get(&entry.txn)
                .is_some_and(|txn| txn.is_active() && txn.is_blocked());
            if !operable {
                continue;
            }
            match self.data.serve_parked(entry.var, entry.snapshot) {
                Some(value) => {
                    let txn = self.txns.get_mut(&entry.txn).expect("checked above");
                    txn.record_read(entry.var);
                    txn.unpark();
                    self.readers
                        .entry(entry.var)
                        .or_default()
                        .insert(entry.txn.clone());
                    tracing::debug!(
                        txn = %entry.txn,
                        var = %entry.var,
                        at = %entry.snapshot,
                        value,
                        "parked read resumed"
                    );
                    notices.push(Notice::Value {
                        var: entry.var,
                        value,
                    });
                }
                None => remaining.push(entry),
            }
        }
        self.parked = remaining;
    }

    fn parse_site(id: u64) -> Option<SiteId> {
        u8::try_from(id).ok().and_then(SiteId::new)
    }
}
