// Run outcomes other than success.

use crate::constants::return_code;
use crate::interrupt::InterruptReason;

/// The reason a run did not complete successfully.
///
/// Together with `Ok(())` this is the closed set of outcomes a
/// `JobRunner::start` call can produce. Callers should match on the variant,
/// not on the message text. Failures inside individual tasks are not
/// represented here: tasks handle their own errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RunnerError {
    /// The deadline elapsed before the task sequence finished.
    #[error("received timeout")]
    Timeout,

    /// An interrupt was observed between two tasks; the remaining tasks never started.
    #[error("received interrupt ({reason})")]
    Interrupted { reason: InterruptReason },
}

impl RunnerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RunnerError::Timeout)
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, RunnerError::Interrupted { .. })
    }

    /// The process exit code a caller should use for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunnerError::Timeout => return_code::TIMEOUT,
            RunnerError::Interrupted { .. } => return_code::INTERRUPTED,
        }
    }

    /// Exit code for any run result, including success.
    pub fn exit_code_for(result: &Result<(), RunnerError>) -> i32 {
        match result {
            Ok(()) => return_code::SUCCESS,
            Err(e) => e.exit_code(),
        }
    }
}
