//! Allocation accounting: the bridge between an object pool and the GC trigger.
//!
//! The pool reports allocations here, `Accounting` keeps the byte count the collection driver
//! decides on, and compaction requests are forwarded back to the pool, either immediately or on
//! a designated [`Executor`].

mod executor;

pub use executor::{Executor, InlineExecutor, Job, WorkerExecutor};

use crate::{
    config::{AccountingMode, Config},
    error::Result,
    stats,
};
use crossbeam_utils::CachePadded;
use std::{
    fmt::{self, Debug, Formatter},
    sync::{
        atomic::{
            AtomicBool, AtomicUsize,
            Ordering::{AcqRel, Acquire, Relaxed, Release},
        },
        Arc,
    },
};
use tracing::{debug, trace};

/// Receives the cumulative allocated byte count after every allocation. Deciding whether that
/// warrants a collection is up to the implementor.
pub trait AllocationTrigger: Send + Sync {
    fn on_allocation(&self, allocated_bytes: usize);
}

impl<F> AllocationTrigger for F
where
    F: Fn(usize) + Send + Sync,
{
    #[inline]
    fn on_allocation(&self, allocated_bytes: usize) {
        self(allocated_bytes)
    }
}

/// The allocator backing managed objects.
pub trait ObjectPool: Send + Sync {
    /// Bytes currently allocated, as tracked by the pool itself. Used in coarse mode.
    fn allocated_size(&self) -> usize;

    /// Returns unused memory to the system.
    fn compact(&self);

    /// Whether the calling thread may use the pool. Deferred compaction is skipped on threads
    /// that may not.
    fn is_current_thread_registered(&self) -> bool {
        true
    }
}

/// Byte accounting for one object pool.
///
/// # Examples
///
/// ```
/// use gc_delay::{
///     alloc::{Accounting, ObjectPool},
///     config::{AccountingMode, Config},
/// };
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// struct Pool;
///
/// impl ObjectPool for Pool {
///     fn allocated_size(&self) -> usize {
///         0
///     }
///
///     fn compact(&self) {}
/// }
///
/// static LAST: AtomicUsize = AtomicUsize::new(0);
///
/// let config = Config::default().with_accounting(AccountingMode::Precise);
/// let accounting = Accounting::new(config, Pool, |bytes: usize| {
///     LAST.store(bytes, Ordering::Relaxed)
/// });
/// accounting.record_allocation(16);
/// accounting.record_allocation(32);
/// assert_eq!(LAST.load(Ordering::Relaxed), 48);
/// accounting.record_free(16);
/// assert_eq!(accounting.allocated_bytes(), 32);
/// ```
pub struct Accounting<P, T> {
    config:               Config,
    pool:                 P,
    trigger:              T,
    precise_bytes:        CachePadded<AtomicUsize>,
    executor:             Option<Box<dyn Executor>>,
    compaction_scheduled: AtomicBool,
}

impl<P, T> Debug for Accounting<P, T> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Accounting")
            .field("config", &self.config)
            .field("precise_bytes", &self.precise_bytes.load(Relaxed))
            .field("executor", &self.executor.is_some())
            .field("compaction_scheduled", &self.compaction_scheduled.load(Relaxed))
            .finish()
    }
}

impl<P: ObjectPool, T: AllocationTrigger> Accounting<P, T> {
    pub fn new(config: Config, pool: P, trigger: T) -> Self {
        Accounting {
            config,
            pool,
            trigger,
            precise_bytes: CachePadded::new(AtomicUsize::new(0)),
            executor: None,
            compaction_scheduled: AtomicBool::new(false),
        }
    }

    /// Designates the executor that [`compact_in_main_thread`] submits to. Without one, deferred
    /// compaction requests are ignored.
    ///
    /// [`compact_in_main_thread`]: Accounting::compact_in_main_thread
    pub fn with_executor<E: Executor + 'static>(mut self, executor: E) -> Self {
        self.executor = Some(Box::new(executor));
        self
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Records an allocation of `size` bytes made by the pool.
    ///
    /// In precise mode this reports the new total to the trigger. In coarse mode the pool reports
    /// through [`on_pool_allocation`](Accounting::on_pool_allocation) instead.
    #[inline]
    pub fn record_allocation(&self, size: usize) {
        if self.config.accounting() == AccountingMode::Precise {
            let total = self.precise_bytes.fetch_add(size, Relaxed) + size;
            stats::allocation_size(size as u64);
            self.trigger.on_allocation(total);
        }
    }

    /// Records that `size` bytes went back to the pool.
    #[inline]
    pub fn record_free(&self, size: usize) {
        if self.config.accounting() == AccountingMode::Precise {
            let _prev = self.precise_bytes.fetch_sub(size, Relaxed);
            debug_assert!(_prev >= size, "freed more bytes than were allocated");
        }
    }

    /// The pool's own allocation hook, called with its current allocated size.
    #[inline]
    pub fn on_pool_allocation(&self, allocated_size: usize) {
        if self.config.accounting() == AccountingMode::Coarse {
            self.trigger.on_allocation(allocated_size);
        }
    }

    /// Bytes currently allocated, according to the configured mode.
    pub fn allocated_bytes(&self) -> usize {
        match self.config.accounting() {
            AccountingMode::Precise => self.precise_bytes.load(Relaxed),
            AccountingMode::Coarse => self.pool.allocated_size(),
        }
    }

    /// Compacts the pool on the calling thread, if compaction is enabled.
    pub fn compact_in_current_thread(&self) {
        if !self.config.compaction_enabled() {
            return;
        }
        trace!("compacting object pool");
        self.pool.compact();
    }
}

impl<P, T> Accounting<P, T>
where
    P: ObjectPool + 'static,
    T: AllocationTrigger + 'static,
{
    /// Asks the designated executor to compact the pool.
    ///
    /// At most one request is in flight: while one is queued or running, further requests are
    /// dropped. Returns `Ok(true)` if a job was submitted. A failed submission clears the
    /// in-flight flag so later requests can try again.
    pub fn compact_in_main_thread(self: &Arc<Self>) -> Result<bool> {
        if !self.config.compaction_enabled() {
            return Ok(false);
        }
        let executor = match &self.executor {
            Some(executor) => executor,
            None => {
                debug!("no compaction executor designated, request ignored");
                return Ok(false);
            }
        };
        if self.compaction_scheduled.swap(true, AcqRel) {
            // already scheduled
            stats::compaction_coalesced();
            debug!("compaction already scheduled, request coalesced");
            return Ok(false);
        }

        let this = Arc::clone(self);
        let job: Job = Box::new(move || {
            if this.pool.is_current_thread_registered() {
                this.compact_in_current_thread();
            }
            this.compaction_scheduled.store(false, Release);
        });
        match executor.submit(job) {
            Ok(()) => {
                stats::compaction_scheduled();
                Ok(true)
            }
            Err(err) => {
                self.compaction_scheduled.store(false, Release);
                Err(err)
            }
        }
    }

    /// Whether a deferred compaction is queued or running.
    pub fn compaction_scheduled(&self) -> bool {
        self.compaction_scheduled.load(Acquire)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingPool {
        size:        AtomicUsize,
        compactions: AtomicUsize,
    }

    impl ObjectPool for CountingPool {
        fn allocated_size(&self) -> usize {
            self.size.load(Relaxed)
        }

        fn compact(&self) {
            let _prev = self.compactions.fetch_add(1, Relaxed);
        }
    }

    fn send_sync<T: Send + Sync>() {}

    #[test]
    fn is_send_sync() {
        send_sync::<Accounting<CountingPool, fn(usize)>>();
    }

    #[test]
    fn precise_ignores_pool_hook() {
        let seen = AtomicUsize::new(0);
        let config = Config::default().with_accounting(AccountingMode::Precise);
        let accounting = Accounting::new(config, CountingPool::default(), |bytes: usize| {
            seen.store(bytes, Relaxed)
        });
        accounting.on_pool_allocation(1024);
        assert_eq!(seen.load(Relaxed), 0);
        accounting.record_allocation(8);
        assert_eq!(seen.load(Relaxed), 8);
        assert_eq!(accounting.allocated_bytes(), 8);
    }

    #[test]
    fn coarse_defers_to_pool() {
        let seen = AtomicUsize::new(0);
        let config = Config::default().with_accounting(AccountingMode::Coarse);
        let accounting = Accounting::new(config, CountingPool::default(), |bytes: usize| {
            seen.store(bytes, Relaxed)
        });
        accounting.record_allocation(8);
        accounting.record_free(8);
        assert_eq!(seen.load(Relaxed), 0);

        accounting.pool().size.store(4096, Relaxed);
        accounting.on_pool_allocation(4096);
        assert_eq!(seen.load(Relaxed), 4096);
        assert_eq!(accounting.allocated_bytes(), 4096);
    }

    #[test]
    fn compaction_disabled() {
        let config = Config::default().with_compaction(false);
        let accounting = Arc::new(
            Accounting::new(config, CountingPool::default(), |_: usize| {})
                .with_executor(InlineExecutor),
        );
        accounting.compact_in_current_thread();
        assert!(!accounting.compact_in_main_thread().unwrap());
        assert_eq!(accounting.pool().compactions.load(Relaxed), 0);
    }

    #[test]
    fn compaction_without_executor() {
        let config = Config::default().with_compaction(true);
        let accounting = Arc::new(Accounting::new(
            config,
            CountingPool::default(),
            |_: usize| {},
        ));
        assert!(!accounting.compact_in_main_thread().unwrap());
        assert!(!accounting.compaction_scheduled());
        accounting.compact_in_current_thread();
        assert_eq!(accounting.pool().compactions.load(Relaxed), 1);
    }

    #[test]
    fn inline_compaction_clears_flag() {
        let config = Config::default().with_compaction(true);
        let accounting = Arc::new(
            Accounting::new(config, CountingPool::default(), |_: usize| {})
                .with_executor(InlineExecutor),
        );
        assert!(accounting.compact_in_main_thread().unwrap());
        assert!(accounting.compact_in_main_thread().unwrap());
        assert!(!accounting.compaction_scheduled());
        assert_eq!(accounting.pool().compactions.load(Relaxed), 2);
    }
}
