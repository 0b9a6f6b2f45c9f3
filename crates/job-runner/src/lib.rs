// job-runner: runs an ordered list of tasks on a background context and
// reports exactly one outcome (success, timeout, or interruption).

pub mod constants;
pub mod errors;
pub mod interrupt;
pub mod job_runner;
pub mod logging;
pub mod settings;

// ---------------------------------------------------------------------------
// Re-exports for convenient access
// ---------------------------------------------------------------------------

pub use errors::RunnerError;
pub use interrupt::{InterruptReason, InterruptSource, ManualInterrupt, SignalInterrupt, Subscription};
pub use job_runner::{JobRunner, Task};
pub use settings::JobRunnerSettings;
