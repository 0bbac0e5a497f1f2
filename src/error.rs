use thiserror::Error;

/// Failure type produced by a unit of work.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the `ExecutorPool`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  #[error("Pool is shutting down or already shut down, cannot accept new tasks")]
  PoolShuttingDown,

  #[error("No Tokio runtime is available to host the pool")]
  NoRuntime,

  #[error("Task result channel error (task was dropped before reporting): {0}")]
  ResultChannelError(String),

  #[error("Submitted task future panicked")]
  TaskPanicked,

  #[error("Task was cancelled by a forced pool shutdown")]
  TaskCancelled,

  #[error("Waiting for pool termination was interrupted")]
  WaitInterrupted,
}

/// Contract violations and fatal conditions surfaced by the runners.
///
/// Recoverable failures of a run never show up here; they are delivered
/// through the callback or hooks instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
  #[error("No callback registered; call set_callback before execute")]
  CallbackMissing,

  #[error("No unit of work is held by the runner (was it reset?)")]
  WorkMissing,

  #[error("Completion gating is disabled for this runner, there is nothing to wait on")]
  GatingDisabled,

  #[error("Timed shutdown was interrupted while waiting for the pool to terminate")]
  ShutdownInterrupted,

  #[error(transparent)]
  Pool(#[from] PoolError),
}
