use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::handle::TaskHandle;
use crate::task::{ManagedTaskInternal, TaskToExecute};

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_POOL_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// A bounded pool of workers fed by an unbounded queue.
///
/// At most `worker_count` units of work run at the same time; everything else
/// waits in submission order. The pool accepts work until `shutdown` or
/// `shutdown_now` is called, after which every submission fails with
/// `PoolError::PoolShuttingDown`.
pub struct ExecutorPool {
  pool_name: Arc<String>,
  worker_count: usize,
  task_queue_tx: Mutex<Option<mpsc::UnboundedSender<ManagedTaskInternal>>>,
  queued_tasks: Arc<AtomicUsize>,
  active_task_info: Arc<DashSet<u64>>,
  shutdown_token: CancellationToken,
  tracker: TaskTracker,
}

impl fmt::Debug for ExecutorPool {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ExecutorPool")
      .field("name", &self.pool_name)
      .field("worker_count", &self.worker_count)
      .field("active_tasks", &self.active_task_info.len())
      .field("queued_tasks", &self.queued_task_count())
      .field("is_shutdown", &self.is_shutdown())
      .finish_non_exhaustive()
  }
}

impl ExecutorPool {
  pub fn new(config: PoolConfig, tokio_handle: TokioHandle) -> Arc<Self> {
    let worker_count = config.effective_worker_count();
    let (tx, rx) = mpsc::unbounded_channel();
    let tracker = TaskTracker::new();

    let pool_arc = Arc::new(Self {
      pool_name: Arc::new(config.name),
      worker_count,
      task_queue_tx: Mutex::new(Some(tx)),
      queued_tasks: Arc::new(AtomicUsize::new(0)),
      active_task_info: Arc::new(DashSet::new()),
      shutdown_token: CancellationToken::new(),
      tracker: tracker.clone(),
    });

    let loop_span = info_span!("executor_pool_dispatch_loop", name = %*pool_arc.pool_name);
    tracker.spawn_on(
      Self::run_dispatch_loop(
        pool_arc.pool_name.clone(),
        Arc::new(Semaphore::new(worker_count)),
        rx,
        tokio_handle.clone(),
        tracker.clone(),
        pool_arc.active_task_info.clone(),
        pool_arc.queued_tasks.clone(),
        pool_arc.shutdown_token.clone(),
      )
      .instrument(loop_span),
      &tokio_handle,
    );

    pool_arc
  }

  /// Creates a pool on the runtime the caller is currently running in.
  pub fn with_current_runtime(config: PoolConfig) -> Result<Arc<Self>, PoolError> {
    let tokio_handle = TokioHandle::try_current().map_err(|_| PoolError::NoRuntime)?;
    Ok(Self::new(config, tokio_handle))
  }

  /// A fresh single-worker pool. Every call yields an independent instance.
  pub fn default_pool() -> Result<Arc<Self>, PoolError> {
    Self::with_current_runtime(PoolConfig::default())
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  pub fn worker_count(&self) -> usize {
    self.worker_count
  }

  pub fn active_task_count(&self) -> usize {
    self.active_task_info.len()
  }

  /// Returns the current number of tasks waiting for a free worker.
  pub fn queued_task_count(&self) -> usize {
    self.queued_tasks.load(AtomicOrdering::Acquire)
  }

  /// True once the pool stopped accepting work.
  pub fn is_shutdown(&self) -> bool {
    self.task_queue_tx.lock().is_none()
  }

  /// True once the pool is shut down and no queued or running work remains.
  pub fn is_terminated(&self) -> bool {
    self.is_shutdown() && self.tracker.is_closed() && self.tracker.is_empty()
  }

  /// Submits a unit of work whose result is delivered through the returned handle.
  pub fn submit<R: Send + 'static>(&self, task_future: TaskToExecute<R>) -> Result<TaskHandle<R>, PoolError> {
    let task_id = NEXT_POOL_TASK_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let task_token = self.shutdown_token.child_token();
    let (result_tx, result_rx) = oneshot::channel::<Result<R, PoolError>>();

    let pool_name = self.pool_name.clone();
    let reporting_future: TaskToExecute<()> = Box::pin(async move {
      let execution_outcome = Self::run_guarded(task_future, &task_token, &pool_name, task_id).await;
      if result_tx.send(execution_outcome).is_err() {
        warn!(
          pool_name = %*pool_name,
          %task_id,
          "Result receiver for task was dropped. Task outcome may have been lost."
        );
      }
    });

    self.enqueue(ManagedTaskInternal {
      task_id,
      future: reporting_future,
    })?;

    Ok(TaskHandle {
      task_id,
      result_receiver: result_rx,
    })
  }

  /// Submits a unit of work without a result channel. Returns the task id.
  ///
  /// Panics inside the work are caught and logged, never propagated.
  pub fn execute(&self, task_future: TaskToExecute<()>) -> Result<u64, PoolError> {
    let task_id = NEXT_POOL_TASK_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let task_token = self.shutdown_token.child_token();

    let pool_name = self.pool_name.clone();
    let logging_future: TaskToExecute<()> = Box::pin(async move {
      match Self::run_guarded(task_future, &task_token, &pool_name, task_id).await {
        Ok(()) => trace!(pool_name = %*pool_name, %task_id, "Fire-and-forget task finished."),
        Err(e) => warn!(pool_name = %*pool_name, %task_id, "Fire-and-forget task did not finish: {}", e),
      }
    });

    self.enqueue(ManagedTaskInternal {
      task_id,
      future: logging_future,
    })?;

    Ok(task_id)
  }

  /// Stops accepting new work. Queued and running work is allowed to finish.
  pub fn shutdown(&self) {
    let sender = self.task_queue_tx.lock().take();
    self.tracker.close();

    if sender.is_some() {
      info!(
        pool_name = %*self.pool_name,
        "Graceful shutdown: task queue closed to new work, {} queued tasks will still run.",
        self.queued_task_count()
      );
    } else {
      trace!(pool_name = %*self.pool_name, "Shutdown requested again; queue already closed.");
    }
  }

  /// Stops accepting new work, cancels running work at its next suspension point
  /// and resolves queued work as `PoolError::TaskCancelled` without running it.
  ///
  /// Does not wait for anything.
  pub fn shutdown_now(&self) {
    self.task_queue_tx.lock().take();
    self.tracker.close();

    if self.shutdown_token.is_cancelled() {
      trace!(pool_name = %*self.pool_name, "Forceful shutdown already in progress.");
      return;
    }

    info!(
      pool_name = %*self.pool_name,
      "Forceful shutdown: cancelling {} active tasks and {} queued tasks.",
      self.active_task_info.len(),
      self.queued_task_count()
    );
    for entry in self.active_task_info.iter() {
      debug!(pool_name = %*self.pool_name, task_id = %entry.key(), "Forcefully cancelling active task.");
    }
    // Task tokens are children of this one.
    self.shutdown_token.cancel();
  }

  /// Waits up to `timeout` for the pool to terminate. Returns whether it did.
  ///
  /// A pool that was never shut down cannot terminate, so this then always
  /// runs for the full timeout and returns `false`.
  pub async fn await_termination(&self, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok()
  }

  /// Like `await_termination`, but gives up with `PoolError::WaitInterrupted`
  /// as soon as `interrupt` is cancelled.
  pub async fn await_termination_interruptible(
    &self,
    timeout: Duration,
    interrupt: &CancellationToken,
  ) -> Result<bool, PoolError> {
    tokio::select! {
      biased;
      _ = interrupt.cancelled() => {
        warn!(pool_name = %*self.pool_name, "Termination wait interrupted.");
        Err(PoolError::WaitInterrupted)
      }
      waited = tokio::time::timeout(timeout, self.tracker.wait()) => Ok(waited.is_ok()),
    }
  }

  /// Graceful shutdown that escalates to `shutdown_now` if the pool has not
  /// terminated within `timeout`. Returns whether the graceful phase sufficed.
  pub async fn shutdown_timeout(&self, timeout: Duration) -> bool {
    self.shutdown();
    if self.await_termination(timeout).await {
      info!(pool_name = %*self.pool_name, "Pool terminated gracefully.");
      return true;
    }
    warn!(pool_name = %*self.pool_name, ?timeout, "Pool did not terminate in time, forcing shutdown.");
    self.shutdown_now();
    false
  }

  /// Interruptible form of `shutdown_timeout`. On interruption the pool is left
  /// in its graceful shutdown state and the error is returned to the caller.
  pub async fn shutdown_timeout_interruptible(
    &self,
    timeout: Duration,
    interrupt: &CancellationToken,
  ) -> Result<bool, PoolError> {
    self.shutdown();
    if self.await_termination_interruptible(timeout, interrupt).await? {
      info!(pool_name = %*self.pool_name, "Pool terminated gracefully.");
      return Ok(true);
    }
    warn!(pool_name = %*self.pool_name, ?timeout, "Pool did not terminate in time, forcing shutdown.");
    self.shutdown_now();
    Ok(false)
  }

  fn enqueue(&self, managed_task: ManagedTaskInternal) -> Result<(), PoolError> {
    let task_id = managed_task.task_id;
    let guard = self.task_queue_tx.lock();
    let Some(tx) = guard.as_ref() else {
      warn!(pool_name = %*self.pool_name, %task_id, "Submit: Attempted to submit task to a pool that is shut down.");
      return Err(PoolError::PoolShuttingDown);
    };

    self.queued_tasks.fetch_add(1, AtomicOrdering::AcqRel);
    if let Err(send_error) = tx.send(managed_task) {
      self.queued_tasks.fetch_sub(1, AtomicOrdering::AcqRel);
      error!(
        pool_name = %*self.pool_name,
        %task_id,
        "Submit: Dispatch loop is gone, task {} could not be queued.",
        send_error.0.task_id
      );
      return Err(PoolError::PoolShuttingDown);
    }

    debug!(pool_name = %*self.pool_name, %task_id, "Task queued.");
    Ok(())
  }

  async fn run_guarded<R>(
    task_future: TaskToExecute<R>,
    token: &CancellationToken,
    pool_name: &str,
    task_id: u64,
  ) -> Result<R, PoolError> {
    tokio::select! {
      biased;
      _ = token.cancelled() => {
        debug!(pool_name = %pool_name, %task_id, "Task execution cancelled by forced shutdown.");
        Err(PoolError::TaskCancelled)
      }
      task_result = AssertUnwindSafe(task_future).catch_unwind() => {
        task_result.map_err(|_panic_payload| {
          error!(pool_name = %pool_name, %task_id, "Task panicked during execution.");
          PoolError::TaskPanicked
        })
      }
    }
  }

  #[allow(clippy::too_many_arguments)]
  async fn run_dispatch_loop(
    pool_name: Arc<String>,
    semaphore: Arc<Semaphore>,
    mut task_queue_rx: mpsc::UnboundedReceiver<ManagedTaskInternal>,
    tasks_tokio_handle: TokioHandle,
    tracker: TaskTracker,
    active_task_info_map: Arc<DashSet<u64>>,
    queued_tasks: Arc<AtomicUsize>,
    shutdown_token: CancellationToken,
  ) {
    info!(name = %*pool_name, workers = semaphore.available_permits(), "Dispatch loop started.");

    loop {
      let permit = tokio::select! {
        biased;
        _ = shutdown_token.cancelled() => {
          info!(name = %*pool_name, "Forced shutdown received. Dispatch loop terminating.");
          break;
        }
        permit_acquisition_result = semaphore.clone().acquire_owned() => match permit_acquisition_result {
          Ok(p) => p,
          Err(_) => {
            error!(name = %*pool_name, "Semaphore closed. Dispatch loop exiting.");
            break;
          }
        },
      };
      trace!(name = %*pool_name, "Acquired worker permit. Available: {}", semaphore.available_permits());

      let next_task = tokio::select! {
        biased;
        _ = shutdown_token.cancelled() => {
          info!(name = %*pool_name, "Forced shutdown received while waiting for work. Releasing permit.");
          drop(permit);
          break;
        }
        recv_result = task_queue_rx.recv() => recv_result,
      };

      let Some(managed_task) = next_task else {
        info!(name = %*pool_name, "Task queue closed and drained. Dispatch loop terminating.");
        break;
      };
      queued_tasks.fetch_sub(1, AtomicOrdering::AcqRel);

      let task_id = managed_task.task_id;
      active_task_info_map.insert(task_id);
      debug!(name = %*pool_name, %task_id, "Dequeued task. Spawning with permit.");

      let active_task_info_map_cleanup = active_task_info_map.clone();
      let pool_name_for_cleanup = pool_name.clone();
      let task_span = info_span!("pool_task", pool_name = %*pool_name, %task_id);
      tracker.spawn_on(
        async move {
          let _permit_guard = permit;
          managed_task.future.await;
          active_task_info_map_cleanup.remove(&task_id);
          debug!(name = %*pool_name_for_cleanup, %task_id, "Task finished processing, removed active info.");
        }
        .instrument(task_span),
        &tasks_tokio_handle,
      );
    }

    if shutdown_token.is_cancelled() {
      task_queue_rx.close();
      let mut discarded = 0usize;
      while let Ok(managed_task) = task_queue_rx.try_recv() {
        queued_tasks.fetch_sub(1, AtomicOrdering::AcqRel);
        // Already cancelled through the parent token, so this resolves
        // immediately with `TaskCancelled` without touching the work.
        managed_task.future.await;
        discarded += 1;
      }
      if discarded > 0 {
        info!(name = %*pool_name, "Discarded {} queued tasks that never started.", discarded);
      }
    }

    info!(
      name = %*pool_name,
      "Dispatch loop stopped. Active tasks remaining: {}",
      active_task_info_map.len()
    );
  }
}

impl Drop for ExecutorPool {
  fn drop(&mut self) {
    if self.task_queue_tx.get_mut().take().is_some() {
      info!(
        pool_name = %*self.pool_name,
        "ExecutorPool dropped. Initiating implicit graceful shutdown (closing queue)."
      );
      self.tracker.close();
    } else {
      trace!(pool_name = %*self.pool_name, "Drop: Shutdown already initiated.");
    }
  }
}
