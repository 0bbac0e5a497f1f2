use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

/// Receives the outcome of a `SingleResultTaskRunner` run.
///
/// Exactly one of `on_completed` and `on_error` fires per `execute()`.
/// `on_thread_stop` fires independently, whenever a task waiting on the
/// runner's completion gate is interrupted.
pub trait TaskCallback<T>: Send + Sync {
  /// The unit of work produced `result`. `is_done` reports whether the task
  /// had finished when its result was read.
  fn on_completed(&self, result: T, is_done: bool);

  /// The unit of work failed, or it could not be submitted or awaited.
  fn on_error(&self, error: &str);

  /// A waiter in `await_completion_interruptible` was interrupted.
  fn on_thread_stop(&self, error: &str);
}

impl<T, C> TaskCallback<T> for Arc<C>
where
  C: TaskCallback<T> + ?Sized,
{
  fn on_completed(&self, result: T, is_done: bool) {
    (**self).on_completed(result, is_done)
  }

  fn on_error(&self, error: &str) {
    (**self).on_error(error)
  }

  fn on_thread_stop(&self, error: &str) {
    (**self).on_thread_stop(error)
  }
}

/// The three callback notifications as a single value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T> {
  Completed { value: T, is_done: bool },
  Failed(String),
  Interrupted(String),
}

/// Lets a channel sender stand in for a callback, delivering every
/// notification as a `TaskOutcome`.
impl<T: Send> TaskCallback<T> for UnboundedSender<TaskOutcome<T>> {
  fn on_completed(&self, result: T, is_done: bool) {
    if self.send(TaskOutcome::Completed { value: result, is_done }).is_err() {
      warn!("Outcome receiver dropped; completion notification lost.");
    }
  }

  fn on_error(&self, error: &str) {
    if self.send(TaskOutcome::Failed(error.to_string())).is_err() {
      warn!("Outcome receiver dropped; error notification lost: {}", error);
    }
  }

  fn on_thread_stop(&self, error: &str) {
    if self.send(TaskOutcome::Interrupted(error.to_string())).is_err() {
      warn!("Outcome receiver dropped; interruption notification lost: {}", error);
    }
  }
}
