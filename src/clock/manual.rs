//! A clock whose time only moves when told to.

use super::Clock;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
    time::{Duration, Instant},
};

/// How often a blocked waiter re-checks virtual time. Only affects how quickly a waiter notices
/// `sleep_until`, not the virtual time it observes.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Virtual deadlines further away than this are clamped, so `Duration::MAX` style budgets still
/// produce a representable `Instant`.
const MAX_TIMEOUT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

struct State {
    elapsed: Duration,
    /// Deadlines of threads currently blocked in `wait_for`.
    pending: Vec<Instant>,
}

struct Inner {
    start:   Instant,
    state:   Mutex<State>,
    changed: Condvar,
}

/// A manually advanced clock for deterministic tests.
///
/// Time starts at an arbitrary point and only advances through [`sleep_until`] and
/// [`sleep_for`]. Clones share the same time.
///
/// [`sleep_until`]: ManualClock::sleep_until
/// [`sleep_for`]: ManualClock::sleep_for
///
/// # Examples
///
/// ```
/// use gc_delay::clock::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.sleep_for(Duration::from_secs(10));
/// assert_eq!(clock.now() - start, Duration::from_secs(10));
/// ```
#[derive(Clone)]
pub struct ManualClock {
    inner: Arc<Inner>,
}

impl Debug for ManualClock {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        formatter
            .debug_struct("ManualClock")
            .field("elapsed", &state.elapsed)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        ManualClock::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            inner: Arc::new(Inner {
                start:   Instant::now(),
                state:   Mutex::new(State {
                    elapsed: Duration::from_secs(0),
                    pending: Vec::new(),
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// Advances time to `instant`. Does nothing if `instant` is in the past.
    pub fn sleep_until(&self, instant: Instant) {
        let target = instant.saturating_duration_since(self.inner.start);
        let mut state = self.inner.state.lock();
        if target > state.elapsed {
            state.elapsed = target;
        }
        drop(state);
        let _woken = self.inner.changed.notify_all();
    }

    /// Advances time by `duration`.
    pub fn sleep_for(&self, duration: Duration) {
        let mut state = self.inner.state.lock();
        state.elapsed += duration;
        drop(state);
        let _woken = self.inner.changed.notify_all();
    }

    /// Blocks the calling thread (in real time) until some thread is waiting in
    /// [`Clock::wait_for`] with a deadline of exactly `deadline`.
    pub fn wait_for_pending(&self, deadline: Instant) {
        let mut state = self.inner.state.lock();
        while !state.pending.contains(&deadline) {
            self.inner.changed.wait(&mut state);
        }
    }

    /// Deadlines of all threads currently blocked on this clock.
    pub fn pending(&self) -> Vec<Instant> {
        self.inner.state.lock().pending.clone()
    }

    fn register(&self, deadline: Instant) {
        self.inner.state.lock().pending.push(deadline);
        let _woken = self.inner.changed.notify_all();
    }

    fn unregister(&self, deadline: Instant) {
        let mut state = self.inner.state.lock();
        if let Some(idx) = state.pending.iter().position(|&d| d == deadline) {
            let _deadline = state.pending.swap_remove(idx);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.inner.start + self.inner.state.lock().elapsed
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
        if condition(&**guard) {
            return true;
        }
        let deadline = self.now() + timeout.min(MAX_TIMEOUT);
        self.register(deadline);
        let result = loop {
            if condition(&**guard) {
                break true;
            }
            if self.now() >= deadline {
                break condition(&**guard);
            }
            let _timed_out = cv.wait_for(guard, POLL_INTERVAL);
        };
        self.unregister(deadline);
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crossbeam_utils::thread;

    #[test]
    fn time_only_moves_on_sleep() {
        let clock = ManualClock::new();
        let start = clock.now();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(clock.now(), start);

        clock.sleep_for(Duration::from_secs(3));
        assert_eq!(clock.now(), start + Duration::from_secs(3));

        clock.sleep_until(start + Duration::from_secs(1));
        assert_eq!(clock.now(), start + Duration::from_secs(3), "time went backwards");

        clock.sleep_until(start + Duration::from_secs(7));
        assert_eq!(clock.now(), start + Duration::from_secs(7));
    }

    #[test]
    fn clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        other.sleep_for(Duration::from_secs(1));
        assert_eq!(clock.now(), other.now());
    }

    #[test]
    fn wait_times_out_on_virtual_time() {
        let clock = ManualClock::new();
        let mutex = Mutex::new(false);
        let cv = Condvar::new();
        let deadline = clock.now() + Duration::from_secs(60 * 60);
        thread::scope(|s| {
            s.spawn(|_| {
                clock.wait_for_pending(deadline);
                clock.sleep_until(deadline);
            });
            let mut guard = mutex.lock();
            assert!(!clock.wait_for(&cv, &mut guard, Duration::from_secs(60 * 60), |&x| x));
        })
        .unwrap();
        assert!(clock.pending().is_empty());
    }

    #[test]
    fn wait_satisfied_before_deadline() {
        let clock = ManualClock::new();
        let mutex = Mutex::new(false);
        let cv = Condvar::new();
        let deadline = clock.now() + Duration::from_secs(10);
        thread::scope(|s| {
            s.spawn(|_| {
                clock.wait_for_pending(deadline);
                clock.sleep_for(Duration::from_secs(1));
                *mutex.lock() = true;
                let _woken = cv.notify_all();
            });
            let mut guard = mutex.lock();
            assert!(clock.wait_for(&cv, &mut guard, Duration::from_secs(10), |&x| x));
        })
        .unwrap();
        assert!(clock.pending().is_empty());
    }

    #[test]
    fn huge_timeout_is_clamped() {
        let clock = ManualClock::new();
        let mutex = Mutex::new(());
        let cv = Condvar::new();
        let mut guard = mutex.lock();
        // false before the deadline is computed, true right after
        let mut checks = 0;
        let forever = Duration::from_secs(u64::max_value());
        assert!(clock.wait_for(&cv, &mut guard, forever, |_| {
            checks += 1;
            checks > 1
        }));
        assert!(clock.pending().is_empty());
    }
}
