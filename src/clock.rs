//! Time sources for [`GcDelay`](crate::delay::GcDelay).
//!
//! The gate never reads the system time directly. All timed waiting goes through a [`Clock`], so
//! tests can substitute [`ManualClock`] and drive timeouts deterministically.

mod manual;

pub use manual::ManualClock;

use parking_lot::{Condvar, MutexGuard};
use std::time::{Duration, Instant};

/// A monotonic clock able to block on a condition variable for a bounded amount of its own time.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> Instant;

    /// Blocks on `cv` until `condition` holds or `timeout` has elapsed on this clock.
    ///
    /// `condition` is checked before the first wait, after every wake-up, and one last time once
    /// the timeout has elapsed. Returns the last value `condition` produced. `guard` is held
    /// whenever `condition` runs.
    fn wait_for<T, F>(
        &self,
        cv: &Condvar,
        guard: &mut MutexGuard<'_, T>,
        timeout: Duration,
        condition: F,
    ) -> bool
    where
        F: FnMut(&T) -> bool;
}

/// The real monotonic clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SteadyClock;

impl Clock for SteadyClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wait_for<T, F>(
        &self,
        cv: &Condvar,
        guard: &mut MutexGuard<'_, T>,
        timeout: Duration,
        mut condition: F,
    ) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => {
                while !condition(&**guard) {
                    if cv.wait_until(guard, deadline).timed_out() {
                        return condition(&**guard);
                    }
                }
                true
            }
            // too far in the future to represent; never times out
            None => {
                while !condition(&**guard) {
                    cv.wait(guard);
                }
                true
            }
        }
    }
}
