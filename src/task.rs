use std::future::Future;
use std::pin::Pin;

/// The type of future that the pool executes.
/// It must be `Send` and `'static`, and produce a result of type `R`.
pub type TaskToExecute<R> = Pin<Box<dyn Future<Output = R> + Send + 'static>>;

/// Internal representation of a unit of work waiting in the pool queue.
///
/// The result type has already been erased: `future` owns whatever reporting
/// the submitter asked for and resolves once that reporting is done. It also
/// owns a child of the pool's shutdown token, so a forced shutdown cancels it.
pub(crate) struct ManagedTaskInternal {
  pub(crate) task_id: u64,
  pub(crate) future: TaskToExecute<()>,
}
