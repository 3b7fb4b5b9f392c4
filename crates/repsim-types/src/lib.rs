//! Core cross-cutting types for the repsim engine.
//!
//! This crate defines the identifier newtypes shared by every other crate
//! in the workspace (variables, sites, logical stamps), the monotone
//! logical clock, and the fixed replication directory that maps a variable
//! to the sites hosting it.

use std::fmt;
use std::num::NonZeroU8;

/// Number of logical data sites in the simulated cluster.
pub const SITE_COUNT: u8 = 10;

/// Number of variables (`x1..x20`) spread across the sites.
pub const VAR_COUNT: u8 = 20;

// ---------------------------------------------------------------------------
// VarId
// ---------------------------------------------------------------------------

/// Identifier of one of the twenty variables, `x1..x20`.
///
/// Domain: `1..=20`. Construction is validated; the textual form is
/// `x<index>`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct VarId(NonZeroU8);

impl VarId {
    /// Construct a `VarId` if `index` is in-domain.
    #[inline]
    pub const fn new(index: u8) -> Option<Self> {
        if index > VAR_COUNT {
            return None;
        }
        match NonZeroU8::new(index) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// The 1-based variable index.
    #[inline]
    pub const fn index(self) -> u8 {
        self.0.get()
    }

    /// The value every copy of this variable holds at logical time zero.
    #[inline]
    pub const fn initial_value(self) -> i64 {
        10 * self.index() as i64
    }

    /// Whether this variable is replicated at every site (even index).
    #[inline]
    pub const fn is_replicated(self) -> bool {
        self.index() % 2 == 0
    }

    /// The single owning site of an odd-indexed variable, `None` for
    /// replicated variables.
    #[inline]
    pub const fn owner_site(self) -> Option<SiteId> {
        if self.is_replicated() {
            return None;
        }
        SiteId::new(1 + self.index() % SITE_COUNT)
    }

    /// The sites hosting this variable: all ten for even indices, the
    /// single owner for odd indices.
    pub fn host_sites(self) -> Vec<SiteId> {
        match self.owner_site() {
            Some(owner) => vec![owner],
            None => SiteId::all().collect(),
        }
    }

    /// Whether `site` hosts a copy of this variable.
    #[inline]
    pub fn hosted_at(self, site: SiteId) -> bool {
        match self.owner_site() {
            Some(owner) => owner == site,
            None => true,
        }
    }

    /// All twenty variables in index order.
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=VAR_COUNT).map(|index| Self::new(index).expect("index in domain"))
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.index())
    }
}

impl std::str::FromStr for VarId {
    type Err = InvalidVarName;

    /// Parse the `x<index>` form, e.g. `x3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || InvalidVarName { name: s.to_owned() };
        let digits = s.strip_prefix('x').ok_or_else(err)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let index: u8 = digits.parse().map_err(|_| err())?;
        Self::new(index).ok_or_else(err)
    }
}

/// Error returned when a variable name is not of the form `x1..x20`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidVarName {
    name: String,
}

impl InvalidVarName {
    /// The offending name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for InvalidVarName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid variable name '{}' (must be x1..x{VAR_COUNT})",
            self.name
        )
    }
}

impl std::error::Error for InvalidVarName {}

// ---------------------------------------------------------------------------
// SiteId
// ---------------------------------------------------------------------------

/// Identifier of one of the ten logical data sites.
///
/// Domain: `1..=10`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct SiteId(NonZeroU8);

impl SiteId {
    /// Construct a `SiteId` if `id` is in-domain.
    #[inline]
    pub const fn new(id: u8) -> Option<Self> {
        if id > SITE_COUNT {
            return None;
        }
        match NonZeroU8::new(id) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// The raw site id.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0.get()
    }

    /// All ten sites in id order.
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=SITE_COUNT).map(|id| Self::new(id).expect("id in domain"))
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

// ---------------------------------------------------------------------------
// Stamp / StampClock
// ---------------------------------------------------------------------------

/// A logical timestamp drawn from the process-wide [`StampClock`].
///
/// Transaction start and commit stamps and site failure/recovery markers
/// all come from the same counter, so they compare directly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct Stamp(u64);

impl Stamp {
    /// The stamp of the initial committed state.
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ts#{}", self.0)
    }
}

/// Monotone logical clock.
///
/// `tick` returns a fresh stamp strictly greater than every stamp handed
/// out before; the counter is process-scoped and never rewinds.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct StampClock {
    current: u64,
}

impl StampClock {
    /// A clock whose next stamp is `1`.
    #[must_use]
    pub const fn new() -> Self {
        Self { current: 0 }
    }

    /// Advance the clock and return the new stamp.
    #[inline]
    pub fn tick(&mut self) -> Stamp {
        self.current += 1;
        Stamp(self.current)
    }

    /// The most recently issued stamp.
    #[inline]
    #[must_use]
    pub const fn now(&self) -> Stamp {
        Stamp(self.current)
    }
}

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// A single committed version of a variable.
///
/// Versions are immutable once created; a cell's version list is
/// append-only and strictly increasing in `committed_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Version {
    pub value: i64,
    pub committed_at: Stamp,
}

impl Version {
    #[inline]
    pub const fn new(value: i64, committed_at: Stamp) -> Self {
        Self {
            value,
            committed_at,
        }
    }
}
