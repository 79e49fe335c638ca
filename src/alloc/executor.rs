//! Where deferred compaction runs.

use crate::error::{Error, Result};
use crossbeam_channel::{self as channel, Sender};
use std::{
    fmt::{self, Debug, Formatter},
    thread::{self, JoinHandle},
};
use tracing::debug;

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs submitted jobs, typically on one designated thread.
pub trait Executor: Send + Sync {
    fn submit(&self, job: Job) -> Result<()>;
}

/// Runs every job immediately on the submitting thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    #[inline]
    fn submit(&self, job: Job) -> Result<()> {
        job();
        Ok(())
    }
}

/// A dedicated thread running jobs in submission order.
///
/// Dropping the executor closes its queue, lets the thread finish the jobs already queued, and
/// joins it.
pub struct WorkerExecutor {
    sender: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl Debug for WorkerExecutor {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("WorkerExecutor")
            .field("thread", &self.handle.as_ref().and_then(|h| h.thread().name()))
            .finish()
    }
}

impl WorkerExecutor {
    /// Spawns the worker thread, named `name`.
    pub fn spawn(name: &str) -> Result<Self> {
        let (sender, receiver) = channel::unbounded::<Job>();
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                for job in receiver {
                    job()
                }
            })?;
        Ok(WorkerExecutor {
            sender: Some(sender),
            handle: Some(handle),
        })
    }
}

impl Executor for WorkerExecutor {
    fn submit(&self, job: Job) -> Result<()> {
        match &self.sender {
            Some(sender) => sender.send(job).map_err(|_| Error::ExecutorShutDown),
            None => Err(Error::ExecutorShutDown),
        }
    }
}

impl Drop for WorkerExecutor {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(handle) = self.handle.take() {
            // The last job may own the executor; a thread cannot join itself.
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                debug!("compaction thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering::Relaxed},
        Arc,
    };

    #[test]
    fn inline_runs_immediately() {
        let ran = Arc::new(AtomicUsize::new(0));
        let job_ran = Arc::clone(&ran);
        InlineExecutor
            .submit(Box::new(move || {
                let _prev = job_ran.fetch_add(1, Relaxed);
            }))
            .unwrap();
        assert_eq!(ran.load(Relaxed), 1);
    }

    #[test]
    fn worker_runs_on_its_own_thread() {
        let (sender, receiver) = channel::bounded(1);
        let executor = WorkerExecutor::spawn("gc-delay-test-worker").unwrap();
        executor
            .submit(Box::new(move || {
                let name = thread::current().name().map(str::to_owned);
                sender.send(name).unwrap();
            }))
            .unwrap();
        assert_eq!(
            receiver.recv().unwrap().as_deref(),
            Some("gc-delay-test-worker")
        );
    }

    #[test]
    fn drop_drains_queue() {
        let ran = Arc::new(AtomicUsize::new(0));
        let executor = WorkerExecutor::spawn("gc-delay-test-drain").unwrap();
        for _ in 0..16 {
            let ran = Arc::clone(&ran);
            executor
                .submit(Box::new(move || {
                    let _prev = ran.fetch_add(1, Relaxed);
                }))
                .unwrap();
        }
        drop(executor);
        assert_eq!(ran.load(Relaxed), 16);
    }
}
