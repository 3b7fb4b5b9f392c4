//! Read and write routing across the ten sites.
//!
//! Reads follow the available-copies policy: a single-copy variable is
//! served by its owner or not at all; a replicated variable needs a site
//! whose version history is unbroken up to the snapshot stamp, and a read
//! parks instead of aborting when such a site exists but none can serve
//! right now.

use repsim_error::EngineError;
use repsim_types::{SiteId, Stamp, VarId};

use crate::site::Site;

/// Routes operations to sites per the replication directory and the
/// availability rules.
#[derive(Debug)]
pub struct DataManager {
    sites: Vec<Site>,
}

impl Default for DataManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DataManager {
    /// Ten fresh sites, all up, holding the initial committed state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sites: SiteId::all().map(Site::new).collect(),
        }
    }

    /// The site with the given id.
    #[must_use]
    pub fn site(&self, id: SiteId) -> &Site {
        &self.sites[usize::from(id.get() - 1)]
    }

    /// All sites in id order.
    pub fn sites(&self) -> impl Iterator<Item = &Site> {
        self.sites.iter()
    }

    /// Snapshot read of `var` at `ts`.
    ///
    /// Single-copy variables: the owner serves or the read fails with
    /// `SiteDown`. Replicated variables: among sites with a stable
    /// history at `ts`, the first one currently able to serve answers;
    /// `NoValidCopy` when no stable site exists, `MustWait` when stable
    /// sites exist but none can serve yet.
    pub fn read(&self, var: VarId, ts: Stamp) -> Result<i64, EngineError> {
        if let Some(owner) = var.owner_site() {
            return self.site(owner).read(var, ts);
        }

        let stable: Vec<&Site> = self
            .sites
            .iter()
            .filter(|site| site.has_stable_history(var, ts))
            .collect();
        if stable.is_empty() {
            return Err(EngineError::NoValidCopy { var });
        }
        for site in &stable {
            match site.read(var, ts) {
                Ok(value) => {
                    tracing::debug!(
                        var = %var,
                        site = site.id().get(),
                        at = %ts,
                        value,
                        "replicated read served"
                    );
                    return Ok(value);
                }
                Err(EngineError::SiteDown { .. } | EngineError::Unavailable { .. }) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(EngineError::MustWait { var })
    }

    /// Attempt to serve a parked read after a recovery. A site with a
    /// stable history for `var` at `ts` holds every version up to `ts`,
    /// so the snapshot read is safe even while the copy is still flagged
    /// stale for ordinary reads.
    #[must_use]
    pub fn serve_parked(&self, var: VarId, ts: Stamp) -> Option<i64> {
        self.sites
            .iter()
            .filter(|site| site.has_stable_history(var, ts))
            .find_map(|site| site.read_committed(var, ts).ok())
    }

    /// Hosts of `var` that are currently not down.
    #[must_use]
    pub fn available_hosts(&self, var: VarId) -> Vec<SiteId> {
        self.sites
            .iter()
            .filter(|site| site.hosts(var) && site.is_available())
            .map(Site::id)
            .collect()
    }

    /// Apply one transaction's buffered writes at its commit stamp.
    /// Every available host receives the version; down hosts are skipped
    /// (the commit validator already vouched for the sites the writer
    /// touched).
    pub fn apply_writes<'a>(
        &self,
        writes: impl IntoIterator<Item = (&'a VarId, &'a i64)>,
        commit: Stamp,
    ) {
        for (&var, &value) in writes {
            for site in &self.sites {
                if !site.hosts(var) || !site.is_available() {
                    continue;
                }
                site.write(var, value, commit)
                    .expect("available host accepts committed write");
            }
        }
    }

    /// Whether any host of `var` committed a version strictly after
    /// `since`. Down sites answer from their retained history.
    #[must_use]
    pub fn had_committed_write_since(&self, var: VarId, since: Stamp) -> bool {
        self.sites
            .iter()
            .any(|site| site.had_committed_write_since(var, since))
    }

    /// Mark a site down, recording the outage start.
    pub fn fail_site(&self, id: SiteId, now: Stamp) {
        self.site(id).fail(now);
    }

    /// Bring a down site back as recovering.
    pub fn recover_site(&self, id: SiteId, now: Stamp) {
        self.site(id).recover(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(index: u8) -> VarId {
        VarId::new(index).unwrap()
    }

    fn site_id(id: u8) -> SiteId {
        SiteId::new(id).unwrap()
    }

    #[test]
    fn test_initial_reads() {
        let dm = DataManager::new();
        assert_eq!(dm.read(var(1), Stamp::new(1)).unwrap(), 10);
        assert_eq!(dm.read(var(8), Stamp::new(1)).unwrap(), 80);
    }

    #[test]
    fn test_single_copy_read_requires_owner() {
        let dm = DataManager::new();
        dm.fail_site(site_id(2), Stamp::new(1));
        // x1 lives only at site 2.
        assert!(matches!(
            dm.read(var(1), Stamp::new(2)),
            Err(EngineError::SiteDown { .. })
        ));
        // x3 lives at site 4 and is unaffected.
        assert_eq!(dm.read(var(3), Stamp::new(2)).unwrap(), 30);
    }

    #[test]
    fn test_replicated_read_skips_broken_histories() {
        let dm = DataManager::new();
        dm.fail_site(site_id(1), Stamp::new(1));
        // Snapshot taken after the failure: site 1's history is broken,
        // the other nine serve.
        assert_eq!(dm.read(var(2), Stamp::new(2)).unwrap(), 20);
    }

    #[test]
    fn test_replicated_read_no_valid_copy() {
        let dm = DataManager::new();
        for id in SiteId::all() {
            dm.fail_site(id, Stamp::new(1));
        }
        for id in SiteId::all() {
            dm.recover_site(id, Stamp::new(2));
        }
        // Every history is broken at ts >= 1 and no commit refreshed x2.
        assert!(matches!(
            dm.read(var(2), Stamp::new(3)),
            Err(EngineError::NoValidCopy { .. })
        ));
    }

    #[test]
    fn test_replicated_read_waits_when_stable_hosts_down() {
        let dm = DataManager::new();
        // Snapshot at 1 precedes every outage, so histories stay stable.
        for id in SiteId::all() {
            dm.fail_site(id, Stamp::new(2));
        }
        assert!(matches!(
            dm.read(var(8), Stamp::new(1)),
            Err(EngineError::MustWait { .. })
        ));

        // A recovery makes the parked read servable even though the copy
        // is still stale for ordinary reads.
        dm.recover_site(site_id(2), Stamp::new(3));
        assert!(matches!(
            dm.read(var(8), Stamp::new(1)),
            Err(EngineError::MustWait { .. })
        ));
        assert_eq!(dm.serve_parked(var(8), Stamp::new(1)), Some(80));
    }

    #[test]
    fn test_apply_writes_skips_down_hosts() {
        let dm = DataManager::new();
        dm.fail_site(site_id(3), Stamp::new(1));
        let writes = [(var(2), 22)].into_iter().collect::<std::collections::BTreeMap<_, _>>();
        dm.apply_writes(&writes, Stamp::new(2));

        assert!(dm.site(site_id(1)).had_committed_write_since(var(2), Stamp::ZERO));
        assert!(!dm.site(site_id(3)).had_committed_write_since(var(2), Stamp::ZERO));
        assert!(dm.had_committed_write_since(var(2), Stamp::new(1)));
    }

    #[test]
    fn test_write_refreshes_recovered_copy() {
        let dm = DataManager::new();
        dm.fail_site(site_id(4), Stamp::new(1));
        dm.recover_site(site_id(4), Stamp::new(2));
        assert!(matches!(
            dm.site(site_id(4)).read(var(6), Stamp::new(3)),
            Err(EngineError::Unavailable { .. })
        ));

        let writes = [(var(6), 66)].into_iter().collect::<std::collections::BTreeMap<_, _>>();
        dm.apply_writes(&writes, Stamp::new(4));
        assert_eq!(dm.site(site_id(4)).read(var(6), Stamp::new(4)).unwrap(), 66);
    }
}
