// Well-known constants shared by the runner and its callers.

use std::time::Duration;

/// Component name used for the runner's trace output.
pub const TRACE_COMPONENT: &str = "JobRunner";

/// Time budget used when no timeout is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound applied when `now + timeout` would overflow the clock.
/// Roughly thirty years, which no run is expected to reach.
pub const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Process exit codes a caller can map run outcomes to.
pub mod return_code {
    pub const SUCCESS: i32 = 0;
    pub const TIMEOUT: i32 = 1;
    pub const INTERRUPTED: i32 = 2;
}

/// Environment variables read by `JobRunnerSettings::apply_env_overrides`.
pub mod variables {
    pub const TIMEOUT_SECONDS: &str = "JOB_RUNNER_TIMEOUT_SECONDS";
    pub const HANDLE_SIGNALS: &str = "JOB_RUNNER_HANDLE_SIGNALS";
}
