use futures_conductor::{CompletionGate, GateWait};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_release_is_idempotent() {
  let gate = CompletionGate::new();
  assert!(!gate.is_released());

  gate.release();
  gate.release();

  assert!(gate.is_released());
  timeout(Duration::from_millis(100), gate.wait()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_release_unblocks_every_waiter() {
  let gate = CompletionGate::new();
  let waiters: Vec<_> = (0..5)
    .map(|_| {
      let gate = gate.clone();
      tokio::spawn(async move { gate.wait().await })
    })
    .collect();

  sleep(Duration::from_millis(20)).await;
  assert!(waiters.iter().all(|w| !w.is_finished()));

  gate.release();
  for waiter in waiters {
    timeout(Duration::from_millis(200), waiter).await.unwrap().unwrap();
  }
}

#[tokio::test]
async fn test_interrupted_wait_reports_interruption() {
  let gate = CompletionGate::new();
  let interrupt = CancellationToken::new();
  interrupt.cancel();

  assert_eq!(gate.wait_interruptible(&interrupt).await, GateWait::Interrupted);
  assert!(!gate.is_released());
}

#[tokio::test]
async fn test_release_wins_over_interrupt_when_both_are_ready() {
  let gate = CompletionGate::new();
  let interrupt = CancellationToken::new();
  gate.release();
  interrupt.cancel();

  assert_eq!(gate.wait_interruptible(&interrupt).await, GateWait::Released);
}

#[test]
fn test_blocking_wait_from_plain_thread() {
  let gate = CompletionGate::new();
  let waiter_gate = gate.clone();
  let waiter = std::thread::spawn(move || {
    waiter_gate.wait_blocking();
    waiter_gate.is_released()
  });

  std::thread::sleep(Duration::from_millis(20));
  gate.release();
  assert!(waiter.join().unwrap());
}
