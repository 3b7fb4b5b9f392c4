//! Append-only version list for a single variable copy.
//!
//! Every cell is born with the variable's initial value committed at
//! logical time zero, so a point-in-time read always resolves.

use repsim_types::{Stamp, VarId, Version};

/// One variable's committed history at one site.
#[derive(Debug, Clone)]
pub struct VersionedCell {
    var: VarId,
    versions: Vec<Version>,
}

impl VersionedCell {
    /// A cell holding only the initial version `(10·i, ts#0)`.
    #[must_use]
    pub fn new(var: VarId) -> Self {
        Self {
            var,
            versions: vec![Version::new(var.initial_value(), Stamp::ZERO)],
        }
    }

    /// The variable this cell stores.
    #[inline]
    #[must_use]
    pub const fn var(&self) -> VarId {
        self.var
    }

    /// Value of the newest version with `committed_at <= ts`.
    #[must_use]
    pub fn read_at(&self, ts: Stamp) -> i64 {
        self.versions
            .iter()
            .rev()
            .find(|version| version.committed_at <= ts)
            .map_or_else(|| self.var.initial_value(), |version| version.value)
    }

    /// The most recently committed version.
    #[must_use]
    pub fn latest(&self) -> Version {
        *self
            .versions
            .last()
            .expect("cell always holds the initial version")
    }

    /// Append a committed version. The caller guarantees `committed_at`
    /// strictly exceeds the newest stored stamp.
    pub fn append(&mut self, value: i64, committed_at: Stamp) {
        debug_assert!(
            committed_at > self.latest().committed_at,
            "version stamps must be strictly increasing: {} after {}",
            committed_at,
            self.latest().committed_at
        );
        self.versions.push(Version::new(value, committed_at));
    }

    /// Whether any stored version was committed strictly after `ts`.
    #[must_use]
    pub fn modified_after(&self, ts: Stamp) -> bool {
        self.latest().committed_at > ts
    }

    /// Whether the current committed value differs from the initial one.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.versions.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(index: u8) -> VersionedCell {
        VersionedCell::new(VarId::new(index).unwrap())
    }

    #[test]
    fn test_initial_version_resolves_everywhere() {
        let cell = cell(7);
        assert_eq!(cell.read_at(Stamp::ZERO), 70);
        assert_eq!(cell.read_at(Stamp::new(1_000)), 70);
        assert!(!cell.is_modified());
    }

    #[test]
    fn test_read_at_picks_newest_not_after() {
        let mut cell = cell(2);
        cell.append(21, Stamp::new(3));
        cell.append(22, Stamp::new(8));

        assert_eq!(cell.read_at(Stamp::new(2)), 20);
        assert_eq!(cell.read_at(Stamp::new(3)), 21);
        assert_eq!(cell.read_at(Stamp::new(7)), 21);
        assert_eq!(cell.read_at(Stamp::new(8)), 22);
        assert_eq!(cell.read_at(Stamp::new(100)), 22);
    }

    #[test]
    fn test_modified_after() {
        let mut cell = cell(4);
        assert!(!cell.modified_after(Stamp::ZERO));
        cell.append(41, Stamp::new(5));
        assert!(cell.modified_after(Stamp::new(4)));
        assert!(!cell.modified_after(Stamp::new(5)));
        assert!(cell.is_modified());
    }

    #[test]
    #[should_panic(expected = "strictly increasing")]
    #[cfg(debug_assertions)]
    fn test_append_rejects_stale_stamp() {
        let mut cell = cell(2);
        cell.append(21, Stamp::new(5));
        cell.append(22, Stamp::new(5));
    }
}
