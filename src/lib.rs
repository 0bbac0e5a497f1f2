//! Single-result task runners and named workers on top of a Tokio-backed
//! executor pool, with one-shot completion gates that let other tasks or
//! threads wait for a run to finish.

mod callback;
mod config;
mod error;
mod gate;
mod handle;
mod pool;
mod runner;
mod task;
mod worker;

pub use callback::{TaskCallback, TaskOutcome};
pub use config::PoolConfig;
pub use error::{BoxError, PoolError, RunnerError};
pub use gate::{CompletionGate, GateWait};
pub use handle::TaskHandle;
pub use pool::ExecutorPool;
pub use runner::SingleResultTaskRunner;
pub use task::TaskToExecute;
pub use worker::{NamedWorker, WorkerHooks};
