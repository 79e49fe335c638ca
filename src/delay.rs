//! The gate deciding when a collection epoch may start.
//!
//! Mutators bracket regions that must not overlap a collection with [`GcDelay::disallow_gc`] and
//! [`GcDelay::allow_gc`]. A collection driver asks for permission to start epoch `E` with
//! [`GcDelay::wait_gc_allowed`], which succeeds once no such region is active, or once some
//! mutator has promised to stay out of the way for `E` via [`GcDelay::try_gc_assist`] or
//! [`GcDelay::on_mutator_will_wait_for_gc`].
//!
//! Disallow-zones are hard exclusion; the blocked epoch is soft, per-epoch cooperation. Epochs
//! passed to the gate must be non-decreasing. This is checked with debug assertions only.

use crate::{
    clock::{Clock, SteadyClock},
    epoch::Epoch,
    stats,
};
use parking_lot::{Condvar, Mutex};
use std::{
    convert::TryFrom,
    fmt::{self, Debug, Formatter},
    time::Duration,
};
use tracing::{debug, warn};

struct State {
    /// Outstanding disallow-zones. Negative only after an unbalanced `allow_gc`.
    disallow_count: i64,

    /// Highest epoch some mutator has committed to honor. Never decreases.
    blocked_epoch: Epoch,

    /// Number of times `wait_gc_allowed` actually had to block.
    delay_count: u64,
}

impl State {
    #[inline]
    fn can_start(&self, epoch: Epoch) -> bool {
        self.disallow_count == 0 || self.blocked_epoch >= epoch
    }
}

/// Arbitrates when a garbage collection epoch is allowed to begin.
///
/// `GcDelay` is meant to be owned by the runtime and shared by reference with every mutator and
/// with the collection driver. The clock is a type parameter so tests can drive timeouts with a
/// [`ManualClock`](crate::clock::ManualClock).
///
/// # Examples
///
/// ```
/// use gc_delay::{delay::GcDelay, epoch::Epoch};
/// use std::time::Duration;
///
/// let delay = GcDelay::new();
/// {
///     let _zone = delay.disallow();
///     assert!(!delay.try_gc_assist(Epoch::new(1)));
///     assert!(!delay.wait_gc_allowed(Epoch::new(1), Duration::from_millis(1)));
/// }
/// assert!(delay.wait_gc_allowed(Epoch::new(1), Duration::from_secs(1)));
/// assert_eq!(delay.gc_delay_count(), 1);
/// ```
pub struct GcDelay<C = SteadyClock> {
    state: Mutex<State>,
    cv:    Condvar,
    clock: C,
}

impl<C> Debug for GcDelay<C> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.pad("GcDelay { .. }")
    }
}

impl Default for GcDelay<SteadyClock> {
    fn default() -> Self {
        GcDelay::new()
    }
}

impl GcDelay<SteadyClock> {
    /// Creates a gate with no active disallow-zones, backed by the system's monotonic clock.
    pub fn new() -> Self {
        GcDelay::with_clock(SteadyClock)
    }
}

impl<C: Clock> GcDelay<C> {
    /// Creates a gate with no active disallow-zones, timing its waits with `clock`.
    pub fn with_clock(clock: C) -> Self {
        GcDelay {
            state: Mutex::new(State {
                disallow_count: 0,
                blocked_epoch:  Epoch::ZERO,
                delay_count:    0,
            }),
            cv: Condvar::new(),
            clock,
        }
    }

    #[inline]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Leaves a disallow-zone.
    ///
    /// Wakes any waiting collection driver once the last zone is left.
    pub fn allow_gc(&self) {
        let mut state = self.state.lock();
        state.disallow_count -= 1;
        let disallow_count = state.disallow_count;
        drop(state);

        if unlikely!(disallow_count < 0) {
            debug_assert!(
                false,
                "`allow_gc` called without a matching `disallow_gc`"
            );
            warn!(disallow_count, "unbalanced `allow_gc`");
        }
        if disallow_count == 0 {
            self.notify_all();
        }
    }

    /// Enters a disallow-zone. Until the matching [`allow_gc`](GcDelay::allow_gc), collections
    /// only start for epochs some mutator has assisted or promised to wait for.
    pub fn disallow_gc(&self) {
        let mut state = self.state.lock();
        state.disallow_count += 1;
        // Only reachable after an unbalanced `allow_gc`.
        let can_allow = state.disallow_count == 0;
        drop(state);

        if unlikely!(can_allow) {
            self.notify_all();
        }
    }

    /// Enters a disallow-zone that is left when the returned guard is dropped.
    #[inline]
    pub fn disallow(&self) -> DisallowGuard<'_, C> {
        self.disallow_gc();
        DisallowGuard { delay: self }
    }

    /// Called by the collection driver before starting `epoch`.
    ///
    /// Returns `true` as soon as no disallow-zone is active or a mutator has released `epoch`
    /// (`blocked_epoch >= epoch`). Returns `false` if neither happened within `max_duration`.
    /// A `false` result leaves the gate untouched; whether to retry, force the collection, or
    /// give up is the caller's decision.
    pub fn wait_gc_allowed(&self, epoch: Epoch, max_duration: Duration) -> bool {
        let mut state = self.state.lock();
        if likely!(state.can_start(epoch)) {
            // Nothing to wait for.
            stats::wait_immediate();
            return true;
        }

        state.delay_count += 1;
        let delay_count = state.delay_count;
        debug!(
            %epoch,
            delay_count,
            max_duration_us = micros(max_duration),
            "in GC delay zone, waiting to start GC"
        );
        stats::wait_blocked();

        let start = self.clock.now();
        let allowed = self
            .clock
            .wait_for(&self.cv, &mut state, max_duration, |state: &State| {
                state.can_start(epoch)
            });
        drop(state);

        let waited = self.clock.now().saturating_duration_since(start);
        stats::wait_time_us(micros(waited));
        if !allowed {
            stats::wait_timed_out();
            warn!(%epoch, delay_count, "in GC delay zone, timed out waiting to start GC");
        }
        allowed
    }

    /// Offers to let `epoch` proceed without waiting for disallow-zones to drain. Never blocks.
    ///
    /// Returns `true` if `epoch` was already released, or if no disallow-zone is active, in which
    /// case `epoch` becomes the blocked epoch. Returns `false` while a disallow-zone is active and
    /// `epoch` has not been released; the caller must then carry on without assisting.
    pub fn try_gc_assist(&self, epoch: Epoch) -> bool {
        let mut state = self.state.lock();
        if state.blocked_epoch >= epoch {
            stats::assist_accepted();
            return true;
        }
        if state.disallow_count > 0 {
            stats::assist_rejected();
            return false;
        }
        state.blocked_epoch = epoch;
        let disallow_count = state.disallow_count;
        drop(state);

        stats::assist_accepted();
        // Waiters can only still be blocked after an unbalanced `allow_gc`.
        if unlikely!(disallow_count < 0) {
            self.notify_all();
        }
        true
    }

    /// Called by a mutator about to block for a while, allowing `epoch` to start in the meantime.
    pub fn on_mutator_will_wait_for_gc(&self, epoch: Epoch) {
        let mut state = self.state.lock();
        let blocked_epoch = state.blocked_epoch;
        if likely!(epoch >= blocked_epoch) {
            state.blocked_epoch = epoch;
        }
        drop(state);

        if unlikely!(epoch < blocked_epoch) {
            debug_assert!(
                false,
                "mutator will wait for epoch {} after epoch {} was released",
                epoch, blocked_epoch
            );
            warn!(%epoch, %blocked_epoch, "out of order epoch ignored");
        }
        stats::mutator_will_wait();
        self.notify_all();
    }

    /// Number of times a collection driver had to block in
    /// [`wait_gc_allowed`](GcDelay::wait_gc_allowed).
    pub fn gc_delay_count(&self) -> u64 {
        self.state.lock().delay_count
    }

    /// Highest epoch released by a mutator so far.
    pub fn blocked_epoch(&self) -> Epoch {
        self.state.lock().blocked_epoch
    }

    /// Number of disallow-zones currently active.
    pub fn disallow_count(&self) -> i64 {
        self.state.lock().disallow_count
    }

    #[inline]
    fn notify_all(&self) {
        let _woken = self.cv.notify_all();
    }
}

#[inline]
fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::max_value())
}

/// A disallow-zone, left on drop. Created by [`GcDelay::disallow`].
#[must_use = "the disallow-zone is left as soon as the guard is dropped"]
pub struct DisallowGuard<'a, C: Clock = SteadyClock> {
    delay: &'a GcDelay<C>,
}

impl<'a, C: Clock> Debug for DisallowGuard<'a, C> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.pad("DisallowGuard { .. }")
    }
}

impl<'a, C: Clock> Drop for DisallowGuard<'a, C> {
    #[inline]
    fn drop(&mut self) {
        self.delay.allow_gc()
    }
}
