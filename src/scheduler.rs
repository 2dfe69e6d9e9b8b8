//! Execution contexts for callback delivery and queue confinement.
//!
//! A [`Scheduler`] is an object that orders tasks and runs them on some
//! execution context. The provider core relies on exactly one of them, a
//! [`SerialScheduler`], as its confinement context: every cache read and
//! write passes through that single worker, which replaces locks with strict
//! ordering. Callers pick their own scheduler per call to choose where result
//! callbacks are delivered.

use std::thread;

use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::executor::{block_on, ThreadPool};
use futures::StreamExt;
use once_cell::sync::Lazy;

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Orders tasks and schedules their execution.
pub trait Scheduler {
  fn schedule(&self, job: Job);
}

// ============================================================================
// InlineScheduler
// ============================================================================

/// Runs the job immediately on the calling thread.
///
/// Useful in tests and for callers that want their callback on whatever
/// thread the storage collaborator fired from.
#[derive(Clone, Copy, Default)]
pub struct InlineScheduler;

impl Scheduler for InlineScheduler {
  #[inline]
  fn schedule(&self, job: Job) { job() }
}

// ============================================================================
// PoolScheduler
// ============================================================================

static DEFAULT_POOL: Lazy<ThreadPool> =
  Lazy::new(|| ThreadPool::new().expect("rxstore: failed to start the delivery thread pool"));

/// Schedules jobs onto a lazily-started global thread pool.
///
/// This is the default choice for result delivery when the caller has no
/// execution context of its own.
#[derive(Clone, Copy, Default)]
pub struct PoolScheduler;

impl Scheduler for PoolScheduler {
  fn schedule(&self, job: Job) { DEFAULT_POOL.spawn_ok(async move { job() }) }
}

// ============================================================================
// SerialScheduler
// ============================================================================

/// Clonable, thread-safe handle to a [`SerialScheduler`] worker.
///
/// Scheduling on a handle whose worker has shut down silently drops the job;
/// a late storage callback against a dead provider becomes a no-op instead of
/// an error.
#[derive(Clone)]
pub struct SerialHandle {
  sender: UnboundedSender<Job>,
}

impl Scheduler for SerialHandle {
  fn schedule(&self, job: Job) { let _ = self.sender.unbounded_send(job); }
}

/// A single named worker thread draining a FIFO job queue.
///
/// Jobs run one at a time, in the order they were scheduled, which is the
/// whole point: code confined to a `SerialScheduler` needs no further
/// synchronization. Dropping the owner closes the queue; jobs already queued
/// still drain before the worker exits.
pub struct SerialScheduler {
  handle: SerialHandle,
  worker: Option<thread::JoinHandle<()>>,
}

impl SerialScheduler {
  pub fn new(name: &str) -> Self {
    let (sender, mut receiver) = unbounded::<Job>();
    let worker = thread::Builder::new()
      .name(name.to_owned())
      .spawn(move || {
        block_on(async move {
          while let Some(job) = receiver.next().await {
            job();
          }
        })
      })
      .expect("rxstore: failed to spawn a confinement worker thread");
    Self { handle: SerialHandle { sender }, worker: Some(worker) }
  }

  /// A clonable handle that outlives borrows of the scheduler itself.
  pub fn handle(&self) -> SerialHandle { self.handle.clone() }
}

impl Scheduler for SerialScheduler {
  #[inline]
  fn schedule(&self, job: Job) { self.handle.schedule(job) }
}

impl Drop for SerialScheduler {
  fn drop(&mut self) {
    self.handle.sender.close_channel();
    if let Some(worker) = self.worker.take() {
      // Draining the remaining jobs is deliberate; joining from the worker
      // itself would deadlock, so a self-drop leaves the thread detached.
      if worker.thread().id() != thread::current().id() {
        let _ = worker.join();
      }
    }
  }
}
