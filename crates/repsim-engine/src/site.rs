//! A logical data site: hosted cells, availability status, and the
//! failure history the commit validator consults.
//!
//! The store sits behind a per-site `parking_lot::Mutex`. The engine is
//! single-threaded today, so the guard is never contended; it exists so
//! parallel command execution can be introduced later without changing
//! observable semantics.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use repsim_error::EngineError;
use repsim_types::{SiteId, Stamp, VarId};

use crate::cell::VersionedCell;

// ---------------------------------------------------------------------------
// SiteStatus / FailureInterval
// ---------------------------------------------------------------------------

/// Availability state of a site.
///
/// A recovered site stays `Recovering` forever: the engine treats it like
/// `Up` everywhere except the per-variable unreadable set, so snapshots
/// taken before the failure remain detectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteStatus {
    Up,
    Down,
    Recovering,
}

/// One completed or still-open outage, in logical time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureInterval {
    /// Stamp at which the site went down.
    pub failed_at: Stamp,
    /// Stamp at which it recovered; `None` while still down.
    pub recovered_at: Option<Stamp>,
}

impl FailureInterval {
    /// Whether the outage intersects `[start, now]` for a transaction
    /// that began at `start`.
    #[must_use]
    pub fn overlaps_lifetime(&self, start: Stamp) -> bool {
        match self.recovered_at {
            None => true,
            Some(recovered_at) => recovered_at >= start,
        }
    }

    /// Whether the outage disqualifies this site's history at snapshot
    /// stamp `ts`. Any outage that began at or before `ts` may have cost
    /// the site a write it can no longer reconstruct.
    #[must_use]
    pub fn breaks_history_at(&self, ts: Stamp) -> bool {
        self.failed_at <= ts
    }
}

// ---------------------------------------------------------------------------
// Site
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SiteInner {
    status: SiteStatus,
    cells: BTreeMap<VarId, VersionedCell>,
    /// Replicated variables that recovered stale and await a refreshing
    /// commit before they may serve reads again.
    unreadable: BTreeSet<VarId>,
    outages: Vec<FailureInterval>,
}

/// One of the ten logical data sites.
#[derive(Debug)]
pub struct Site {
    id: SiteId,
    inner: Mutex<SiteInner>,
}

impl Site {
    /// A fresh site holding the initial version of every variable the
    /// replication directory assigns to it.
    #[must_use]
    pub fn new(id: SiteId) -> Self {
        let cells = VarId::all()
            .filter(|var| var.hosted_at(id))
            .map(|var| (var, VersionedCell::new(var)))
            .collect();
        Self {
            id,
            inner: Mutex::new(SiteInner {
                status: SiteStatus::Up,
                cells,
                unreadable: BTreeSet::new(),
                outages: Vec::new(),
            }),
        }
    }

    #[inline]
    #[must_use]
    pub const fn id(&self) -> SiteId {
        self.id
    }

    #[must_use]
    pub fn status(&self) -> SiteStatus {
        self.inner.lock().status
    }

    /// Whether the site can participate in reads and writes (`Up` or
    /// `Recovering`).
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status() != SiteStatus::Down
    }

    /// Whether this site hosts a copy of `var`.
    #[must_use]
    pub fn hosts(&self, var: VarId) -> bool {
        var.hosted_at(self.id)
    }

    /// Point-in-time read honoring availability and staleness: rejects
    /// when the site is down, the variable is not hosted here, or the
    /// copy recovered stale and has not been refreshed.
    pub fn read(&self, var: VarId, ts: Stamp) -> Result<i64, EngineError> {
        let inner = self.inner.lock();
        if inner.status == SiteStatus::Down {
            return Err(EngineError::SiteDown {
                site: self.id,
                var,
            });
        }
        let cell = inner.cells.get(&var).ok_or(EngineError::NotHosted {
            site: self.id,
            var,
        })?;
        if inner.unreadable.contains(&var) {
            return Err(EngineError::Unavailable {
                site: self.id,
                var,
            });
        }
        Ok(cell.read_at(ts))
    }

    /// Point-in-time read that bypasses the unreadable set. Only valid
    /// when the caller has established that this site holds a stable
    /// history for `var` at `ts`, which guarantees every version up to
    /// `ts` is present regardless of staleness.
    pub fn read_committed(&self, var: VarId, ts: Stamp) -> Result<i64, EngineError> {
        let inner = self.inner.lock();
        if inner.status == SiteStatus::Down {
            return Err(EngineError::SiteDown {
                site: self.id,
                var,
            });
        }
        inner
            .cells
            .get(&var)
            .map(|cell| cell.read_at(ts))
            .ok_or(EngineError::NotHosted {
                site: self.id,
                var,
            })
    }

    /// Append a committed version. Requires the site to be available;
    /// the write also re-synchronizes a stale recovered copy.
    pub fn write(&self, var: VarId, value: i64, committed_at: Stamp) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if inner.status == SiteStatus::Down {
            return Err(EngineError::SiteDown {
                site: self.id,
                var,
            });
        }
        let site = self.id;
        let cell = inner
            .cells
            .get_mut(&var)
            .ok_or(EngineError::NotHosted { site, var })?;
        cell.append(value, committed_at);
        inner.unreadable.remove(&var);
        Ok(())
    }

    /// Whether any hosted copy of `var` was committed strictly after
    /// `since`. `false` for variables not hosted here.
    #[must_use]
    pub fn had_committed_write_since(&self, var: VarId, since: Stamp) -> bool {
        self.inner
            .lock()
            .cells
            .get(&var)
            .is_some_and(|cell| cell.modified_after(since))
    }

    /// Transition `Up -> Down`, opening a failure interval. No-op from
    /// `Down` or `Recovering`.
    pub fn fail(&self, now: Stamp) {
        let mut inner = self.inner.lock();
        if inner.status != SiteStatus::Up {
            return;
        }
        inner.status = SiteStatus::Down;
        inner.unreadable.clear();
        inner.outages.push(FailureInterval {
            failed_at: now,
            recovered_at: None,
        });
        tracing::info!(site = self.id.get(), at = %now, "site failed");
    }

    /// Transition `Down -> Recovering`, closing the open failure interval
    /// and marking every hosted replicated variable unreadable until its
    /// next committed write. No-op unless the site is down.
    pub fn recover(&self, now: Stamp) {
        let mut inner = self.inner.lock();
        if inner.status != SiteStatus::Down {
            return;
        }
        inner.status = SiteStatus::Recovering;
        let open = inner
            .outages
            .last_mut()
            .expect("a down site has an open outage");
        debug_assert!(open.recovered_at.is_none());
        open.recovered_at = Some(now);
        let stale: Vec<VarId> = inner
            .cells
            .keys()
            .copied()
            .filter(|var| var.is_replicated())
            .collect();
        inner.unreadable.extend(stale);
        tracing::info!(site = self.id.get(), at = %now, "site recovered");
    }

    /// Whether this site hosts `var` with no outage intersecting
    /// `(-inf, ts]`: the stable-history predicate of the read policy.
    #[must_use]
    pub fn has_stable_history(&self, var: VarId, ts: Stamp) -> bool {
        let inner = self.inner.lock();
        inner.cells.contains_key(&var)
            && !inner.outages.iter().any(|outage| outage.breaks_history_at(ts))
    }

    /// Whether any outage intersects the lifetime of a transaction that
    /// began at `start` (the commit validator's failure-span check).
    #[must_use]
    pub fn failed_during(&self, start: Stamp) -> bool {
        self.inner
            .lock()
            .outages
            .iter()
            .any(|outage| outage.overlaps_lifetime(start))
    }

    /// Immutable view of the recorded failure intervals.
    #[must_use]
    pub fn failure_intervals(&self) -> Vec<FailureInterval> {
        self.inner.lock().outages.clone()
    }

    /// Hosted variables whose committed value differs from the initial
    /// one, with their current values, in index order.
    #[must_use]
    pub fn modified_variables(&self) -> Vec<(VarId, i64)> {
        self.inner
            .lock()
            .cells
            .values()
            .filter(|cell| cell.is_modified())
            .map(|cell| (cell.var(), cell.latest().value))
            .collect()
    }
}
