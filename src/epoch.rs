//! Collection epochs.
//!
//! An epoch names one attempted collection cycle. Epochs are handed out by the collection driver
//! in non-decreasing order; `gc-delay` only compares them.

use core::fmt::{self, Display, Formatter};

/// Identifier of a collection cycle.
///
/// The first real collection is conventionally epoch `1`; [`Epoch::ZERO`] is the "nothing blocked
/// yet" value a fresh [`GcDelay`](crate::delay::GcDelay) starts from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(i64);

impl Epoch {
    /// The epoch before any collection.
    pub const ZERO: Epoch = Epoch(0);

    #[inline]
    pub const fn new(epoch: i64) -> Self {
        Epoch(epoch)
    }

    #[inline]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// The epoch following `self`.
    #[inline]
    pub fn next(self) -> Self {
        Epoch(
            self.0
                .checked_add(1)
                .expect("overflowed the maximum collection epoch"),
        )
    }
}

impl From<i64> for Epoch {
    #[inline]
    fn from(epoch: i64) -> Self {
        Epoch(epoch)
    }
}

impl From<Epoch> for i64 {
    #[inline]
    fn from(epoch: Epoch) -> Self {
        epoch.0
    }
}

impl Display for Epoch {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, formatter)
    }
}
