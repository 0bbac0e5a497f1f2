use futures_conductor::{ExecutorPool, NamedWorker, PoolConfig, RunnerError, TaskToExecute, WorkerHooks};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter =
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,futures_conductor=trace"));

    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

struct RecordingHooks {
  body_duration: Duration,
  events: Mutex<Vec<&'static str>>,
  body_finished: AtomicBool,
  errors: Mutex<Vec<String>>,
}

impl RecordingHooks {
  fn with_body_duration(body_duration: Duration) -> Self {
    Self {
      body_duration,
      events: Mutex::new(Vec::new()),
      body_finished: AtomicBool::new(false),
      errors: Mutex::new(Vec::new()),
    }
  }
}

impl WorkerHooks for RecordingHooks {
  fn before_start(&self) {
    self.events.lock().push("before_start");
  }

  fn on_started(self: Arc<Self>) -> TaskToExecute<()> {
    Box::pin(async move {
      self.events.lock().push("on_started");
      sleep(self.body_duration).await;
      self.body_finished.store(true, Ordering::SeqCst);
    })
  }

  fn on_error(&self, error: &str) {
    self.errors.lock().push(error.to_string());
  }
}

struct InterruptAwareHooks {
  interruptions: Mutex<Vec<String>>,
  errors: Mutex<Vec<String>>,
}

impl WorkerHooks for InterruptAwareHooks {
  fn before_start(&self) {}

  fn on_started(self: Arc<Self>) -> TaskToExecute<()> {
    Box::pin(async {})
  }

  fn on_error(&self, error: &str) {
    self.errors.lock().push(error.to_string());
  }

  fn on_interrupted(&self, error: &str) {
    self.interruptions.lock().push(error.to_string());
  }
}

fn cancel_after(delay: Duration) -> CancellationToken {
  let interrupt = CancellationToken::new();
  let interrupter = interrupt.clone();
  tokio::spawn(async move {
    sleep(delay).await;
    interrupter.cancel();
  });
  interrupt
}

#[tokio::test]
async fn test_start_runs_hooks_without_waiting_for_body() {
  setup_tracing_for_test();
  let worker = NamedWorker::with_name("test_worker_start", RecordingHooks::with_body_duration(Duration::from_millis(100)));

  let started = Instant::now();
  worker.start();
  assert!(started.elapsed() < Duration::from_millis(50));
  assert!(!worker.hooks().body_finished.load(Ordering::SeqCst));

  sleep(Duration::from_millis(200)).await;
  assert!(worker.hooks().body_finished.load(Ordering::SeqCst));
  assert_eq!(*worker.hooks().events.lock(), vec!["before_start", "on_started"]);
  assert!(worker.hooks().errors.lock().is_empty());
  assert!(worker.normal_shut_down().await);
}

#[tokio::test]
async fn test_pool_is_named_after_worker() {
  setup_tracing_for_test();
  let worker = NamedWorker::with_name("test_worker_named_pool", RecordingHooks::with_body_duration(Duration::ZERO));
  assert!(worker.executor().is_none());

  let pool_name = worker.start().executor().unwrap().name().to_string();
  assert_eq!(pool_name, "test_worker_named_pool");

  worker.set_name("renamed");
  assert_eq!(worker.name(), "renamed");
  worker.shut_down_now();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_gated_waiter_unblocks_after_start() {
  setup_tracing_for_test();
  let worker = Arc::new(NamedWorker::new(RecordingHooks::with_body_duration(Duration::from_millis(10))));
  worker.set_gating_enabled(true);

  let waiter_worker = worker.clone();
  let waiter = tokio::spawn(async move { waiter_worker.stop_current_thread().await });
  sleep(Duration::from_millis(30)).await;
  assert!(!waiter.is_finished());

  worker.start();
  timeout(Duration::from_millis(200), waiter).await.unwrap().unwrap().unwrap();
  worker.shut_down_now();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_plain_thread_can_wait_for_start() {
  setup_tracing_for_test();
  let worker = Arc::new(NamedWorker::new(RecordingHooks::with_body_duration(Duration::ZERO)));
  worker.set_gating_enabled(true);

  let waiter_worker = worker.clone();
  let waiter = std::thread::spawn(move || waiter_worker.stop_current_thread_blocking());
  sleep(Duration::from_millis(30)).await;
  assert!(!waiter.is_finished());

  worker.start();
  let waited = tokio::task::spawn_blocking(move || waiter.join().unwrap()).await.unwrap();
  assert_eq!(waited, Ok(()));

  let ungated = NamedWorker::new(RecordingHooks::with_body_duration(Duration::ZERO));
  assert_eq!(ungated.stop_current_thread_blocking(), Err(RunnerError::GatingDisabled));
  worker.shut_down_now();
}

#[tokio::test]
async fn test_stop_current_thread_without_gating_is_a_usage_error() {
  setup_tracing_for_test();
  let worker = NamedWorker::new(RecordingHooks::with_body_duration(Duration::ZERO));

  let result = timeout(Duration::from_millis(100), worker.stop_current_thread()).await;
  assert_eq!(result, Ok(Err(RunnerError::GatingDisabled)));
}

#[tokio::test]
async fn test_failed_submission_reports_error_and_releases_gate() {
  setup_tracing_for_test();
  let pool = ExecutorPool::with_current_runtime(PoolConfig::default().with_name("worker_dead_pool")).unwrap();
  pool.shutdown();
  let worker = NamedWorker::with_executor("test_worker_dead_pool", pool, RecordingHooks::with_body_duration(Duration::ZERO));
  worker.set_gating_enabled(true);

  worker.start();

  assert_eq!(*worker.hooks().events.lock(), vec!["before_start"]);
  assert_eq!(worker.hooks().errors.lock().len(), 1);
  assert!(worker.hooks().errors.lock()[0].contains("shut down"));
  timeout(Duration::from_millis(100), worker.stop_current_thread()).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_interrupted_wait_defaults_to_error_hook() {
  setup_tracing_for_test();
  let worker = NamedWorker::new(RecordingHooks::with_body_duration(Duration::ZERO));
  worker.set_gating_enabled(true);

  let interrupt = cancel_after(Duration::from_millis(20));
  timeout(Duration::from_millis(200), worker.stop_current_thread_interruptible(&interrupt))
    .await
    .unwrap()
    .unwrap();

  assert_eq!(worker.hooks().errors.lock().len(), 1);
  assert!(worker.hooks().errors.lock()[0].contains("interrupted"));
}

#[tokio::test]
async fn test_interrupted_wait_uses_interrupt_hook_when_overridden() {
  setup_tracing_for_test();
  let worker = NamedWorker::new(InterruptAwareHooks {
    interruptions: Mutex::new(Vec::new()),
    errors: Mutex::new(Vec::new()),
  });
  worker.set_gating_enabled(true);

  let interrupt = cancel_after(Duration::from_millis(20));
  worker.stop_current_thread_interruptible(&interrupt).await.unwrap();

  assert_eq!(worker.hooks().interruptions.lock().len(), 1);
  assert!(worker.hooks().errors.lock().is_empty());
}

#[tokio::test]
async fn test_timed_shutdown_forces_slow_body() {
  setup_tracing_for_test();
  let worker = NamedWorker::with_name("test_worker_timed_shutdown", RecordingHooks::with_body_duration(Duration::from_millis(500)));
  worker.start();
  sleep(Duration::from_millis(10)).await;

  let started = Instant::now();
  assert!(!worker.shut_down_thread(Duration::from_millis(100)).await);
  let elapsed = started.elapsed();
  assert!(elapsed >= Duration::from_millis(100) && elapsed < Duration::from_millis(300));
  assert!(!worker.hooks().body_finished.load(Ordering::SeqCst));

  worker.start();
  assert_eq!(worker.hooks().errors.lock().len(), 1);
  assert!(worker.executor().unwrap().await_termination(Duration::from_millis(200)).await);
}

#[tokio::test]
async fn test_interrupted_timed_shutdown_reports_through_error_hook() {
  setup_tracing_for_test();
  let worker = NamedWorker::new(RecordingHooks::with_body_duration(Duration::from_secs(2)));
  worker.start();
  sleep(Duration::from_millis(10)).await;

  let interrupt = cancel_after(Duration::from_millis(30));
  assert!(!worker.shut_down_thread_interruptible(Duration::from_secs(5), &interrupt).await);

  assert_eq!(worker.hooks().errors.lock().len(), 1);
  assert!(worker.hooks().errors.lock()[0].contains("interrupted"));
  worker.shut_down_now();
}
