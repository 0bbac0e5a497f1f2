use crate::config::PoolConfig;
use crate::error::{PoolError, RunnerError};
use crate::gate::{self, CompletionGate, GateWait, ReleaseOnDrop};
use crate::pool::ExecutorPool;
use crate::task::TaskToExecute;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_WORKER_NAME: &str = "named-worker";
const NORMAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);
const WAIT_INTERRUPTED: &str = "wait on the completion gate was interrupted";

/// Behavior plugged into a `NamedWorker`.
pub trait WorkerHooks: Send + Sync + 'static {
  /// Runs on the caller of `start()`, before anything is submitted.
  fn before_start(&self);

  /// The worker body, run on the pool.
  ///
  /// Failures inside the body are the body's own business; the worker does
  /// not forward them to `on_error`.
  fn on_started(self: Arc<Self>) -> TaskToExecute<()>;

  /// Submission of the body failed, or a timed shutdown was interrupted.
  fn on_error(&self, error: &str);

  /// A waiter in `stop_current_thread_interruptible` was interrupted.
  fn on_interrupted(&self, error: &str) {
    self.on_error(error);
  }
}

/// A named unit of background work whose body runs on its own pool.
///
/// `start()` returns as soon as the body is submitted; the body then runs
/// concurrently with the caller.
pub struct NamedWorker<H: WorkerHooks> {
  name: Mutex<String>,
  pool: Mutex<Option<Arc<ExecutorPool>>>,
  gating_enabled: AtomicBool,
  gate: Mutex<Option<CompletionGate>>,
  hooks: Arc<H>,
}

impl<H: WorkerHooks> NamedWorker<H> {
  pub fn new(hooks: H) -> Self {
    Self::with_name(DEFAULT_WORKER_NAME, hooks)
  }

  /// The worker's pool is created on first `start()` and named after the worker.
  pub fn with_name(name: impl Into<String>, hooks: H) -> Self {
    Self {
      name: Mutex::new(name.into()),
      pool: Mutex::new(None),
      gating_enabled: AtomicBool::new(false),
      gate: Mutex::new(None),
      hooks: Arc::new(hooks),
    }
  }

  pub fn with_executor(name: impl Into<String>, pool: Arc<ExecutorPool>, hooks: H) -> Self {
    let worker = Self::with_name(name, hooks);
    *worker.pool.lock() = Some(pool);
    worker
  }

  pub fn name(&self) -> String {
    self.name.lock().clone()
  }

  pub fn set_name(&self, name: impl Into<String>) {
    *self.name.lock() = name.into();
  }

  pub fn executor(&self) -> Option<Arc<ExecutorPool>> {
    self.pool.lock().clone()
  }

  pub fn set_executor(&self, pool: Arc<ExecutorPool>) {
    *self.pool.lock() = Some(pool);
  }

  pub fn hooks(&self) -> &Arc<H> {
    &self.hooks
  }

  /// Enabling arms a pending gate right away; `start()` releases it.
  pub fn set_gating_enabled(&self, enabled: bool) {
    self.gating_enabled.store(enabled, Ordering::Release);
    if enabled {
      gate::arm(&mut *self.gate.lock());
    }
  }

  pub fn is_gating_enabled(&self) -> bool {
    self.gating_enabled.load(Ordering::Acquire)
  }

  /// Runs `before_start`, submits `on_started` to the pool and returns. A
  /// failed submission is reported through `on_error`. The gate, if enabled,
  /// is released last.
  pub fn start(&self) -> &Self {
    let name = self.name();
    let gate = if self.is_gating_enabled() {
      self.gate.lock().clone()
    } else {
      None
    };
    let _release = ReleaseOnDrop::new(gate);

    debug!(worker = %name, "Running before_start hook.");
    self.hooks.before_start();

    let submission = self
      .ensure_pool()
      .and_then(|pool| pool.execute(self.hooks.clone().on_started()));
    match submission {
      Ok(task_id) => debug!(worker = %name, %task_id, "Worker body submitted."),
      Err(e) => {
        warn!(worker = %name, "Worker body could not be submitted: {}", e);
        self.hooks.on_error(&e.to_string());
      }
    }
    self
  }

  fn ensure_pool(&self) -> Result<Arc<ExecutorPool>, PoolError> {
    let mut guard = self.pool.lock();
    if let Some(pool) = guard.as_ref() {
      return Ok(pool.clone());
    }
    let pool = ExecutorPool::with_current_runtime(PoolConfig::default().with_name(self.name()))?;
    info!(pool_name = %pool.name(), "Created pool for named worker.");
    *guard = Some(pool.clone());
    Ok(pool)
  }

  /// Waits until `start()` has finished submitting the body.
  pub async fn stop_current_thread(&self) -> Result<(), RunnerError> {
    let gate = self.gate_for_waiting()?;
    gate.wait().await;
    Ok(())
  }

  /// Parks the current OS thread until `start()` has finished submitting the
  /// body. Must not be called from inside an async context.
  pub fn stop_current_thread_blocking(&self) -> Result<(), RunnerError> {
    let gate = self.gate_for_waiting()?;
    gate.wait_blocking();
    Ok(())
  }

  /// Like `stop_current_thread`, reporting an interruption through
  /// `on_interrupted`.
  pub async fn stop_current_thread_interruptible(&self, interrupt: &CancellationToken) -> Result<(), RunnerError> {
    let gate = self.gate_for_waiting()?;
    if gate.wait_interruptible(interrupt).await == GateWait::Interrupted {
      self.hooks.on_interrupted(WAIT_INTERRUPTED);
    }
    Ok(())
  }

  fn gate_for_waiting(&self) -> Result<CompletionGate, RunnerError> {
    if !self.is_gating_enabled() {
      return Err(RunnerError::GatingDisabled);
    }
    Ok(self.gate.lock().get_or_insert_with(CompletionGate::new).clone())
  }

  /// Graceful shutdown, forced once `timeout` elapses. Returns whether the
  /// pool terminated within the timeout.
  pub async fn shut_down_thread(&self, timeout: Duration) -> bool {
    match self.executor() {
      Some(pool) => pool.shutdown_timeout(timeout).await,
      None => true,
    }
  }

  /// Like `shut_down_thread`; an interruption is reported through `on_error`
  /// and yields `false`.
  pub async fn shut_down_thread_interruptible(&self, timeout: Duration, interrupt: &CancellationToken) -> bool {
    let Some(pool) = self.executor() else {
      return true;
    };
    match pool.shutdown_timeout_interruptible(timeout, interrupt).await {
      Ok(terminated) => terminated,
      Err(e) => {
        self.hooks.on_error(&e.to_string());
        false
      }
    }
  }

  /// `shut_down_thread` with a one second timeout.
  pub async fn normal_shut_down(&self) -> bool {
    self.shut_down_thread(NORMAL_SHUTDOWN_TIMEOUT).await
  }

  pub fn shut_down_now(&self) {
    if let Some(pool) = self.executor() {
      pool.shutdown_now();
    }
  }
}
