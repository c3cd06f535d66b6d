//! Period numbering and period-index resolution types.
//!
//! A `Period` is a monotonically increasing index over TDC-to-TDC
//! intervals. Two sentinel values carry special meaning: [`Period::UNDEFINED`]
//! marks a free histogram slot, and [`Period::MAX`] is used to force a full
//! purge of per-chip period state on shutdown.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A monotonically increasing TDC-interval index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Period(pub i64);

impl Period {
    /// Sentinel denoting a free (unclaimed) histogram slot.
    pub const UNDEFINED: Period = Period(i64::MIN);

    /// Sentinel used to force purging of all remaining period state.
    pub const MAX: Period = Period(i64::MAX);

    /// Creates a period from a plain index.
    #[inline]
    pub const fn new(index: i64) -> Self {
        Self(index)
    }

    /// Returns the next period.
    #[inline]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the previous period.
    #[inline]
    pub fn prev(self) -> Self {
        Self(self.0 - 1)
    }

    /// Raw signed period index.
    #[inline]
    pub const fn index(self) -> i64 {
        self.0
    }

    /// True for [`Period::UNDEFINED`].
    #[inline]
    pub fn is_undefined(self) -> bool {
        self == Self::UNDEFINED
    }
}

impl From<i64> for Period {
    fn from(index: i64) -> Self {
        Self(index)
    }
}

/// Resolution of a floating-point period prediction into one or two
/// candidate periods.
///
/// When `disputed` is `false`, the timestamp unambiguously belongs to
/// `period`. When `disputed` is `true`, the timestamp fell in the fuzzy
/// boundary zone and may belong to either `period` or `disputed_period`
/// until a TDC marker resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodIndex {
    /// The earlier (or sole, if undisputed) candidate period.
    pub period: Period,
    /// The later candidate period; equal to `period` when undisputed.
    pub disputed_period: Period,
    /// Whether the timestamp lies in the disputed boundary zone.
    pub disputed: bool,
}

impl PeriodIndex {
    /// Creates an unambiguous period index.
    #[inline]
    pub fn resolved(period: Period) -> Self {
        Self {
            period,
            disputed_period: period,
            disputed: false,
        }
    }

    /// Creates a disputed period index spanning `period` and
    /// `disputed_period` (expected to be `period.next()`).
    #[inline]
    pub fn disputed(period: Period, disputed_period: Period) -> Self {
        Self {
            period,
            disputed_period,
            disputed: true,
        }
    }
}
