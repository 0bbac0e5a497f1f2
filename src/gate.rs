use tokio_util::sync::CancellationToken;
use tracing::trace;

/// How a wait on a `CompletionGate` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateWait {
  /// The gate was released.
  Released,
  /// The waiter's interrupt token fired first.
  Interrupted,
}

/// A one-shot completion gate.
///
/// Starts pending, is released exactly once, and lets any number of waiters
/// through after that. Releasing an already released gate does nothing.
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct CompletionGate {
  token: CancellationToken,
}

impl CompletionGate {
  pub fn new() -> Self {
    Self {
      token: CancellationToken::new(),
    }
  }

  pub fn release(&self) {
    if self.token.is_cancelled() {
      trace!("Completion gate already released.");
      return;
    }
    self.token.cancel();
    trace!("Completion gate released.");
  }

  pub fn is_released(&self) -> bool {
    self.token.is_cancelled()
  }

  /// Waits until the gate is released.
  pub async fn wait(&self) {
    self.token.cancelled().await;
  }

  /// Waits until the gate is released or `interrupt` is cancelled, whichever
  /// comes first. A release that is already visible wins over an interrupt.
  pub async fn wait_interruptible(&self, interrupt: &CancellationToken) -> GateWait {
    tokio::select! {
      biased;
      _ = self.token.cancelled() => GateWait::Released,
      _ = interrupt.cancelled() => GateWait::Interrupted,
    }
  }

  /// Parks the current OS thread until the gate is released.
  ///
  /// Must not be called from inside an async context.
  pub fn wait_blocking(&self) {
    futures::executor::block_on(self.token.cancelled());
  }
}

/// Installs a pending gate in `slot` for a new cycle and returns it.
///
/// A gate that is still pending is kept, so waiters that arrived before the
/// cycle started are released by it. Only a released gate is replaced.
pub(crate) fn arm(slot: &mut Option<CompletionGate>) -> CompletionGate {
  match slot {
    Some(gate) if !gate.is_released() => gate.clone(),
    _ => {
      let gate = CompletionGate::new();
      *slot = Some(gate.clone());
      trace!("Armed a fresh completion gate.");
      gate
    }
  }
}

/// Releases the wrapped gate when dropped, however its holder exits.
pub(crate) struct ReleaseOnDrop(Option<CompletionGate>);

impl ReleaseOnDrop {
  pub(crate) fn new(gate: Option<CompletionGate>) -> Self {
    Self(gate)
  }
}

impl Drop for ReleaseOnDrop {
  fn drop(&mut self) {
    if let Some(gate) = self.0.take() {
      gate.release();
    }
  }
}
