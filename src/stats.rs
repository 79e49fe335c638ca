//! Statistics collection. Enabled with `--features stats`.
//!
//! Counters are recorded per thread and merged into a global aggregate when the thread exits or
//! calls [`thread_flush`].

#![cfg_attr(not(feature = "stats"), allow(dead_code))]

use parking_lot::Mutex;
#[cfg(feature = "stats")]
use std::cell::RefCell;

/// Samples of a quantity: how many, their sum and the largest one.
#[doc(hidden)]
#[derive(Clone, Copy, Default, Debug)]
pub struct Size {
    count: u64,
    total: u64,
    max:   u64,
}

impl Size {
    pub(crate) fn record(&mut self, size: u64) {
        self.count += 1;
        self.total = self.total.saturating_add(size);
        self.max = self.max.max(size);
    }

    fn merge(&mut self, rhs: &Self) {
        self.count += rhs.count;
        self.total = self.total.saturating_add(rhs.total);
        self.max = self.max.max(rhs.max);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Average sample, if any were recorded.
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.total as f64 / self.count as f64)
        }
    }
}

#[doc(hidden)]
#[derive(Clone, Default, Debug)]
pub struct Event {
    count: usize,
}

impl Event {
    fn happened(&mut self) {
        self.count += 1
    }

    fn merge(&mut self, rhs: &Self) {
        self.count += rhs.count
    }

    /// Number of times the event happened.
    pub fn count(&self) -> usize {
        self.count
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "stats")] {
        #[derive(Default)]
        struct ThreadStats(Stats);

        impl Drop for ThreadStats {
            fn drop(&mut self) {
                self.flush()
            }
        }

        impl ThreadStats {
            fn flush(&mut self) {
                GLOBAL.lock().merge(&self.0);
                self.0 = Default::default()
            }
        }

        thread_local! {
            static THREAD_STAT: RefCell<ThreadStats> = {
                // initialize global now, so the merge on thread exit never races its construction
                lazy_static::initialize(&GLOBAL);
                RefCell::default()
            };
        }

        fn flush_current_thread() {
            // `try_with` fails only while the thread is being torn down, after the final flush
            let _flushed = THREAD_STAT.try_with(|stats| stats.borrow_mut().flush());
        }

        macro_rules! stats_func {
            ($(#[$attr:meta])* $name:ident: Event) => {
                #[inline]
                $(#[$attr])*
                pub(crate) fn $name() {
                    THREAD_STAT.with(|stats| stats.borrow_mut().0.$name.happened())
                }
            };
            ($(#[$attr:meta])* $name:ident: Size) => {
                #[inline]
                $(#[$attr])*
                pub(crate) fn $name(size: u64) {
                    THREAD_STAT.with(|stats| stats.borrow_mut().0.$name.record(size))
                }
            };
        }
    } else {
        fn flush_current_thread() {}

        macro_rules! stats_func {
            ($(#[$attr:meta])* $name:ident: Event) => {
                #[inline(always)]
                $(#[$attr])*
                pub(crate) fn $name() {}
            };
            ($(#[$attr:meta])* $name:ident: Size) => {
                #[inline(always)]
                $(#[$attr])*
                pub(crate) fn $name(_size: u64) {}
            };
        }
    }
}

macro_rules! stats {
    ($($(#[$attr:meta])* $names:ident: $kinds:tt),* $(,)*) => {
        /// A collection of gc-delay statistics.
        #[derive(Clone, Default, Debug)]
        pub struct Stats {
            $($(#[$attr])* pub $names: $kinds),*
        }

        impl Stats {
            fn merge(&mut self, rhs: &Self) {
                $(self.$names.merge(&rhs.$names));*
            }
        }

        $(stats_func!{$(#[$attr])* $names: $kinds})*
    };
}

stats! {
    /// A `wait_gc_allowed` call that returned without blocking.
    wait_immediate:       Event,

    /// A `wait_gc_allowed` call that had to block.
    wait_blocked:         Event,

    /// A blocking `wait_gc_allowed` call that ran out of budget.
    wait_timed_out:       Event,

    /// Clock time, in microseconds, spent blocked in `wait_gc_allowed`.
    wait_time_us:         Size,

    /// A `try_gc_assist` call that let the epoch proceed.
    assist_accepted:      Event,

    /// A `try_gc_assist` call refused because a disallow-zone was active.
    assist_rejected:      Event,

    /// An `on_mutator_will_wait_for_gc` notification.
    mutator_will_wait:    Event,

    /// Bytes per precisely accounted allocation.
    allocation_size:      Size,

    /// A compaction job submitted to the designated executor.
    compaction_scheduled: Event,

    /// A compaction request dropped because one was already in flight.
    compaction_coalesced: Event,
}

impl Stats {
    pub fn print_summary(&self) {
        println!("{:#?}", self);

        let waits = self.wait_immediate.count + self.wait_blocked.count;
        println!(
            "{:>12}: {:>12} {:>12}: {:>12} {:>12}: {:>12}",
            "gc waits",
            waits,
            "blocked",
            self.wait_blocked.count,
            "timed out",
            self.wait_timed_out.count
        );
        if let Some(mean) = self.wait_time_us.mean() {
            println!(
                "{:>12}: {:>10.1}us {:>12}: {:>10}us",
                "mean wait", mean, "longest", self.wait_time_us.max
            );
        }
        println!(
            "{:>12}: {:>12} {:>12}: {:>12} {:>12}: {:>12}",
            "assisted",
            self.assist_accepted.count,
            "refused",
            self.assist_rejected.count,
            "will wait",
            self.mutator_will_wait.count
        );
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL: Mutex<Stats> = Mutex::default();
}

/// Prints the statistics merged so far.
pub fn print_stats() {
    if cfg!(feature = "stats") {
        GLOBAL.lock().print_summary();
    } else {
        println!("`gc-delay/stats` feature is not enabled")
    }
}

/// Merges the calling thread's statistics into the global aggregate.
pub fn thread_flush() {
    flush_current_thread()
}

/// A copy of the statistics merged so far. Call [`thread_flush`] first to include the calling
/// thread's own counters.
pub fn snapshot() -> Stats {
    GLOBAL.lock().clone()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn size_merge() {
        let mut a = Size::default();
        a.record(4);
        a.record(10);
        let mut b = Size::default();
        b.record(1);
        a.merge(&b);
        assert_eq!(a.count(), 3);
        assert_eq!(a.total(), 15);
        assert_eq!(a.max, 10);
        assert_eq!(a.mean(), Some(5.0));

        let mut empty = Size::default();
        empty.merge(&Size::default());
        assert_eq!(empty.count(), 0);
        assert_eq!(empty.mean(), None);
    }

    #[test]
    fn size_saturates() {
        let mut size = Size::default();
        size.record(u64::max_value());
        size.record(1);
        assert_eq!(size.total(), u64::max_value());
    }

    #[test]
    fn event_merge() {
        let mut a = Event::default();
        a.happened();
        let mut b = Event::default();
        b.happened();
        b.happened();
        a.merge(&b);
        assert_eq!(a.count(), 3);
    }

    #[cfg(feature = "stats")]
    #[test]
    fn flush_reaches_global() {
        let before = snapshot().assist_rejected.count();
        assist_rejected();
        assist_rejected();
        thread_flush();
        assert!(snapshot().assist_rejected.count() >= before + 2);
    }
}
