//! Bounded worker pool that runs cache rebuilds off the read path.
//!
//! A fixed number of named worker threads pull tasks from an unbounded
//! channel. Submitting never blocks and never fails while the scheduler is
//! running; when every worker is busy, tasks simply queue. The scheduler is
//! meant to be created once per process and injected into every
//! [`CacheClient`](crate::CacheClient) that needs it.

use std::fmt;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::CacheConfig;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-width pool of rebuild workers with an unbounded queue.
///
/// # Lifecycle
///
/// Workers start in [`new`](Self::new). [`shutdown`](Self::shutdown) stops
/// accepting work, lets the workers drain everything already queued and
/// joins them. Dropping the scheduler performs the same shutdown.
///
/// # Examples
///
/// ```
/// use cacheguard_core::RebuildScheduler;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let scheduler = RebuildScheduler::new(2).unwrap();
/// let runs = Arc::new(AtomicUsize::new(0));
///
/// for _ in 0..5 {
///     let runs = Arc::clone(&runs);
///     assert!(scheduler.submit(move || {
///         runs.fetch_add(1, Ordering::SeqCst);
///     }));
/// }
///
/// scheduler.shutdown();
/// assert_eq!(runs.load(Ordering::SeqCst), 5);
/// ```
pub struct RebuildScheduler {
    sender: Mutex<Option<flume::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
    width: usize,
}

impl RebuildScheduler {
    /// Starts a scheduler with `width` worker threads.
    ///
    /// A width of zero is bumped to one.
    pub fn new(width: usize) -> io::Result<Self> {
        let width = width.max(1);
        let (sender, receiver) = flume::unbounded::<Job>();
        let pending = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(width);
        for index in 0..width {
            let receiver = receiver.clone();
            let pending = Arc::clone(&pending);
            let handle = thread::Builder::new()
                .name(format!("cache-rebuild-{}", index))
                .spawn(move || Self::worker_loop(&receiver, &pending))?;
            workers.push(handle);
        }

        info!(workers = width, "rebuild scheduler started");
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            pending,
            width,
        })
    }

    /// Starts a scheduler sized by [`CacheConfig::rebuild_workers`].
    pub fn from_config(config: &CacheConfig) -> io::Result<Self> {
        Self::new(config.rebuild_workers)
    }

    /// Queues `task` for execution on a worker thread.
    ///
    /// Returns `false` only if the scheduler has been shut down, in which
    /// case `task` is dropped without running.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            warn!("rebuild scheduler is shut down, task rejected");
            return false;
        };

        self.pending.fetch_add(1, Ordering::AcqRel);
        if sender.send(Box::new(task)).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            warn!("rebuild workers are gone, task rejected");
            return false;
        }
        true
    }

    /// Number of worker threads.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Tasks queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_shutdown(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Blocks until no task is queued or running, or `timeout` elapses.
    ///
    /// Returns `true` if the scheduler went idle in time.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.pending() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Stops accepting tasks, drains the queue and joins every worker.
    ///
    /// Calling it more than once is harmless.
    pub fn shutdown(&self) {
        let sender = self.sender.lock().take();
        if sender.is_none() {
            return;
        }
        let drained = self.pending();
        drop(sender);

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                error!("rebuild worker exited abnormally");
            }
        }
        info!(drained, "rebuild scheduler stopped");
    }

    fn worker_loop(receiver: &flume::Receiver<Job>, pending: &AtomicUsize) {
        // recv fails once every sender is gone and the queue is empty.
        while let Ok(job) = receiver.recv() {
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                error!("rebuild task panicked");
            }
            pending.fetch_sub(1, Ordering::AcqRel);
        }
        debug!("rebuild worker exiting");
    }
}

impl fmt::Debug for RebuildScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RebuildScheduler")
            .field("width", &self.width)
            .field("pending", &self.pending())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl Drop for RebuildScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
