use futures_conductor::{NamedWorker, TaskToExecute, WorkerHooks};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

struct Downloader {
  url: String,
}

impl WorkerHooks for Downloader {
  fn before_start(&self) {
    info!("Preparing download of {}", self.url);
  }

  fn on_started(self: Arc<Self>) -> TaskToExecute<()> {
    Box::pin(async move {
      info!("Downloading {} ...", self.url);
      tokio::time::sleep(Duration::from_millis(300)).await;
      info!("Downloaded {}", self.url);
    })
  }

  fn on_error(&self, err: &str) {
    error!("Worker error: {}", err);
  }
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Named Worker Example ---");

  let worker = NamedWorker::with_name(
    "downloader",
    Downloader {
      url: "https://example.org/data.csv".to_string(),
    },
  );
  worker.set_gating_enabled(true);
  worker.start();

  worker.stop_current_thread().await.expect("gating is enabled");
  info!("Body submitted; main keeps going while it runs.");

  tokio::time::sleep(Duration::from_millis(400)).await;
  let terminated = worker.normal_shut_down().await;
  info!("Worker pool terminated gracefully: {}", terminated);

  // The pool no longer accepts work, so this lands in on_error.
  worker.start();
  info!("--- Named Worker Example End ---");
}
