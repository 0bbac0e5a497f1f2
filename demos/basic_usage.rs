use futures_conductor::{BoxError, SingleResultTaskRunner, TaskCallback};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

struct LoggingCallback;

impl TaskCallback<u64> for LoggingCallback {
  fn on_completed(&self, result: u64, is_done: bool) {
    info!("Completed with {} (done: {})", result, is_done);
  }

  fn on_error(&self, error: &str) {
    info!("Failed: {}", error);
  }

  fn on_thread_stop(&self, error: &str) {
    info!("Waiter interrupted: {}", error);
  }
}

async fn slow_sum(upto: u64) -> Result<u64, BoxError> {
  tokio::time::sleep(Duration::from_millis(200)).await;
  Ok((1..=upto).sum())
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Basic Usage Example ---");

  let runner = Arc::new(SingleResultTaskRunner::with_gating(|| slow_sum(100), true));
  runner.set_callback(LoggingCallback);

  let waiter_runner = runner.clone();
  let waiter = tokio::spawn(async move {
    info!("Waiter: holding until the runner reports.");
    waiter_runner.await_completion().await.expect("gating is enabled");
    info!("Waiter: released.");
  });

  runner.execute().await.expect("callback is registered");
  waiter.await.expect("waiter task failed");

  let terminated = runner.shutdown_timeout(Duration::from_secs(1)).await;
  info!("Pool terminated gracefully: {}", terminated);
  info!("--- Basic Usage Example End ---");
}
