/// Settings for an `ExecutorPool`.
///
/// `worker_count` bounds how many units of work run at once; the queue in
/// front of the workers is unbounded. `name` labels the pool's spans and log
/// lines the way a thread factory would name its threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
  pub worker_count: usize,
  pub name: String,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      worker_count: 1,
      name: "executor-pool".to_string(),
    }
  }
}

impl PoolConfig {
  pub fn with_worker_count(mut self, worker_count: usize) -> Self {
    self.worker_count = worker_count.max(1);
    self
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  /// Worker count actually used by the pool; zero is clamped to one.
  pub(crate) fn effective_worker_count(&self) -> usize {
    self.worker_count.max(1)
  }
}
