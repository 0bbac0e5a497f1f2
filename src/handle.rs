use crate::error::PoolError;
use tokio::sync::oneshot;

/// A handle to a unit of work submitted to the `ExecutorPool`.
#[derive(Debug)]
pub struct TaskHandle<R: Send + 'static> {
  pub(crate) task_id: u64,
  pub(crate) result_receiver: oneshot::Receiver<Result<R, PoolError>>,
}

impl<R: Send + 'static> TaskHandle<R> {
  /// Returns the unique ID of this task.
  pub fn id(&self) -> u64 {
    self.task_id
  }

  /// Awaits the completion of the task and returns its result.
  ///
  /// # Errors
  /// Returns `PoolError::TaskPanicked` if the task panicked, `PoolError::TaskCancelled`
  /// if a forced shutdown stopped it, and `PoolError::ResultChannelError` if it was
  /// dropped without reporting anything.
  pub async fn await_result(self) -> Result<R, PoolError> {
    match self.result_receiver.await {
      Ok(task_outcome_result) => task_outcome_result,
      Err(recv_error) => {
        tracing::warn!(task_id = %self.task_id, "Result channel receive error: {}", recv_error);
        Err(PoolError::ResultChannelError(format!(
          "Task (id: {}) result channel unexpectedly closed: {}",
          self.task_id, recv_error
        )))
      }
    }
  }
}
