use crate::callback::TaskCallback;
use crate::error::{BoxError, PoolError, RunnerError};
use crate::gate::{self, CompletionGate, GateWait, ReleaseOnDrop};
use crate::pool::ExecutorPool;
use crate::task::TaskToExecute;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

type UnitOfWork<T> = Arc<dyn Fn() -> TaskToExecute<Result<T, BoxError>> + Send + Sync>;

const EXECUTE_INTERRUPTED: &str = "execute() was interrupted before the unit of work reported a result";
const WAIT_INTERRUPTED: &str = "wait on the completion gate was interrupted";

/// Runs one unit of work on an `ExecutorPool`, waits for its result and
/// reports the outcome through a `TaskCallback`.
///
/// With gating enabled, other tasks can `await_completion()` to be held until
/// the current run has reported its outcome. The runner is meant to be shared
/// (e.g. behind an `Arc`) between the task driving `execute()` and its waiters.
pub struct SingleResultTaskRunner<T: Send + 'static> {
  work: Mutex<Option<UnitOfWork<T>>>,
  pool: Mutex<Option<Arc<ExecutorPool>>>,
  gating_enabled: bool,
  gate: Mutex<Option<CompletionGate>>,
  last_task_id: Mutex<Option<u64>>,
  callback: Mutex<Option<Arc<dyn TaskCallback<T>>>>,
}

impl<T: Send + 'static> SingleResultTaskRunner<T> {
  /// `pool` of `None` means a fresh single-worker pool is created on the
  /// first `execute()`.
  pub fn new<F, Fut>(work: F, pool: Option<Arc<ExecutorPool>>, gating_enabled: bool) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
  {
    Self {
      work: Mutex::new(Some(Self::box_work(work))),
      pool: Mutex::new(pool),
      gating_enabled,
      gate: Mutex::new(None),
      last_task_id: Mutex::new(None),
      callback: Mutex::new(None),
    }
  }

  /// Default pool, gating disabled.
  pub fn from_work<F, Fut>(work: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
  {
    Self::new(work, None, false)
  }

  pub fn with_gating<F, Fut>(work: F, gating_enabled: bool) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
  {
    Self::new(work, None, gating_enabled)
  }

  fn box_work<F, Fut>(work: F) -> UnitOfWork<T>
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
  {
    Arc::new(move || -> TaskToExecute<Result<T, BoxError>> { Box::pin(work()) })
  }

  /// Must be called before `execute()`.
  pub fn set_callback<C: TaskCallback<T> + 'static>(&self, callback: C) {
    *self.callback.lock() = Some(Arc::new(callback));
  }

  /// Replaces the unit of work, e.g. after `reset()`.
  pub fn set_work<F, Fut>(&self, work: F)
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
  {
    *self.work.lock() = Some(Self::box_work(work));
  }

  pub fn is_gating_enabled(&self) -> bool {
    self.gating_enabled
  }

  pub fn executor(&self) -> Option<Arc<ExecutorPool>> {
    self.pool.lock().clone()
  }

  /// Id of the most recently submitted task, if any.
  pub fn last_task_id(&self) -> Option<u64> {
    *self.last_task_id.lock()
  }

  /// Submits the unit of work, waits for it, and fires exactly one of
  /// `on_completed` / `on_error`. The completion gate, if enabled, is released
  /// after the callback returns, whatever the outcome.
  ///
  /// Dropping the returned future before it resolves counts as an interrupted
  /// wait: `on_error` fires and the gate is released.
  ///
  /// # Errors
  /// Only usage errors: `RunnerError::CallbackMissing` or
  /// `RunnerError::WorkMissing`. Failures of the run itself go to the callback.
  /// The gate is released on these paths too.
  pub async fn execute(&self) -> Result<(), RunnerError> {
    let release = ReleaseOnDrop::new(self.gating_enabled.then(|| gate::arm(&mut *self.gate.lock())));
    let callback = self.callback.lock().clone().ok_or(RunnerError::CallbackMissing)?;
    let work = self.work.lock().clone().ok_or(RunnerError::WorkMissing)?;

    let mut cycle = CycleGuard {
      callback,
      reported: false,
      _release: release,
    };

    match self.submit_and_await(work).await {
      Ok(Ok(value)) => cycle.complete(value),
      Ok(Err(work_error)) => cycle.fail(&format!("unit of work failed: {}", work_error)),
      Err(pool_error) => cycle.fail(&pool_error.to_string()),
    }
    Ok(())
  }

  async fn submit_and_await(&self, work: UnitOfWork<T>) -> Result<Result<T, BoxError>, PoolError> {
    let pool = self.ensure_pool()?;
    let handle = pool.submit(work())?;
    *self.last_task_id.lock() = Some(handle.id());
    debug!(pool_name = %pool.name(), task_id = handle.id(), "Unit of work submitted, awaiting result.");
    handle.await_result().await
  }

  fn ensure_pool(&self) -> Result<Arc<ExecutorPool>, PoolError> {
    let mut guard = self.pool.lock();
    if let Some(pool) = guard.as_ref() {
      return Ok(pool.clone());
    }
    let pool = ExecutorPool::default_pool()?;
    debug!(pool_name = %pool.name(), "Created default pool for runner.");
    *guard = Some(pool.clone());
    Ok(pool)
  }

  /// Waits until the current run has reported its outcome.
  ///
  /// Returns immediately if the last run already finished and no new one has
  /// started. A waiter arriving before the first `execute()` waits for it.
  pub async fn await_completion(&self) -> Result<(), RunnerError> {
    let gate = self.gate_for_waiting()?;
    gate.wait().await;
    Ok(())
  }

  /// Parks the current OS thread until the current run has reported its
  /// outcome. Must not be called from inside an async context.
  pub fn await_completion_blocking(&self) -> Result<(), RunnerError> {
    let gate = self.gate_for_waiting()?;
    gate.wait_blocking();
    Ok(())
  }

  /// Like `await_completion`, but stops waiting when `interrupt` is cancelled
  /// and reports that through `on_thread_stop`.
  pub async fn await_completion_interruptible(&self, interrupt: &CancellationToken) -> Result<(), RunnerError> {
    let gate = self.gate_for_waiting()?;
    if gate.wait_interruptible(interrupt).await == GateWait::Interrupted {
      let callback = self.callback.lock().clone();
      match callback {
        Some(callback) => callback.on_thread_stop(WAIT_INTERRUPTED),
        None => warn!("Completion wait interrupted with no callback registered to report it."),
      }
    }
    Ok(())
  }

  fn gate_for_waiting(&self) -> Result<CompletionGate, RunnerError> {
    if !self.gating_enabled {
      return Err(RunnerError::GatingDisabled);
    }
    Ok(self.gate.lock().get_or_insert_with(CompletionGate::new).clone())
  }

  /// Graceful pool shutdown: no new work, queued work still runs.
  pub fn shutdown(&self) {
    if let Some(pool) = self.executor() {
      pool.shutdown();
    }
  }

  /// Graceful shutdown, forced once `timeout` elapses. Returns whether the
  /// pool terminated within the timeout.
  pub async fn shutdown_timeout(&self, timeout: Duration) -> bool {
    match self.executor() {
      Some(pool) => pool.shutdown_timeout(timeout).await,
      None => true,
    }
  }

  /// # Errors
  /// `RunnerError::ShutdownInterrupted` if `interrupt` fires while waiting.
  /// The interruption is fatal to the shutdown and is not reported through
  /// the callback.
  pub async fn shutdown_timeout_interruptible(
    &self,
    timeout: Duration,
    interrupt: &CancellationToken,
  ) -> Result<bool, RunnerError> {
    let Some(pool) = self.executor() else {
      return Ok(true);
    };
    pool
      .shutdown_timeout_interruptible(timeout, interrupt)
      .await
      .map_err(|e| match e {
        PoolError::WaitInterrupted => RunnerError::ShutdownInterrupted,
        other => RunnerError::Pool(other),
      })
  }

  /// Forced pool shutdown. Does not wait.
  pub fn shutdown_now(&self) {
    if let Some(pool) = self.executor() {
      pool.shutdown_now();
    }
  }

  /// Drops the unit of work, callback, gate and last task id. The pool is kept
  /// and left running.
  pub fn reset(&self) {
    *self.work.lock() = None;
    *self.last_task_id.lock() = None;
    *self.gate.lock() = None;
    *self.callback.lock() = None;
    trace!("Runner state cleared.");
  }
}

/// Drives the terminal notification of one `execute()` cycle.
///
/// Field order matters: the gate is released only after `drop` has had the
/// chance to report an unreported cycle.
struct CycleGuard<T: Send + 'static> {
  callback: Arc<dyn TaskCallback<T>>,
  reported: bool,
  _release: ReleaseOnDrop,
}

impl<T: Send + 'static> CycleGuard<T> {
  fn complete(&mut self, value: T) {
    self.reported = true;
    self.callback.on_completed(value, true);
  }

  fn fail(&mut self, error: &str) {
    self.reported = true;
    warn!("Runner cycle failed: {}", error);
    self.callback.on_error(error);
  }
}

impl<T: Send + 'static> Drop for CycleGuard<T> {
  fn drop(&mut self) {
    if !self.reported {
      self.reported = true;
      warn!("{}", EXECUTE_INTERRUPTED);
      self.callback.on_error(EXECUTE_INTERRUPTED);
    }
  }
}
