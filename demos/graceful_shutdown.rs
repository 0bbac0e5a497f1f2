use futures_conductor::{ExecutorPool, PoolConfig, TaskHandle};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

async fn work_task_fn(id: usize, duration_ms: u64) -> String {
  info!("Task {} starting (will run for {}ms)", id, duration_ms);
  tokio::time::sleep(Duration::from_millis(duration_ms)).await;
  let result = format!("Task {} finished after {}ms", id, duration_ms);
  info!("{}", result);
  result
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Graceful Shutdown Example ---");

  let pool = ExecutorPool::new(
    PoolConfig::default().with_name("graceful_shutdown_pool").with_worker_count(2),
    Handle::current(),
  );

  // With two workers, tasks 0 and 1 start and 2..4 wait in the queue.
  let mut handles: Vec<TaskHandle<String>> = Vec::new();
  for i in 0..5 {
    match pool.submit(Box::pin(work_task_fn(i, 300))) {
      Ok(handle) => handles.push(handle),
      Err(e) => tracing::error!("Failed to submit task {}: {:?}", i, e),
    }
  }
  info!(
    "Submitted 5 tasks. Queue size: {}, Active: {}",
    pool.queued_task_count(),
    pool.active_task_count()
  );

  // Queued work still runs; only the last stragglers get forced.
  let terminated = pool.shutdown_timeout(Duration::from_millis(700)).await;
  info!("Terminated within the timeout: {}", terminated);

  match pool.submit(Box::pin(work_task_fn(99, 10))) {
    Ok(_) => tracing::error!("LATE SUBMISSION SUCCEEDED (UNEXPECTED!)"),
    Err(e) => info!("Late submission correctly failed: {:?}", e),
  }

  for handle in handles {
    let task_id = handle.id();
    match handle.await_result().await {
      Ok(result) => info!("Task {} result: {}", task_id, result),
      Err(e) => info!("Task {} error (forced by the timeout): {:?}", task_id, e),
    }
  }
  info!("--- Graceful Shutdown Example End ---");
}
