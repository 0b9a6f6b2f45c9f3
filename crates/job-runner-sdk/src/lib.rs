// job-runner-sdk: Foundation layer for the job runner.
// This crate has no dependencies on other workspace crates and provides
// the diagnostic trace abstraction plus a few string helpers.

pub mod string_util;
pub mod trace;

// Re-export commonly used items at crate root
pub use string_util::StringUtil;
pub use trace::{CollectingTraceWriter, NullTraceWriter, TraceLevel, TraceWriter, TracingTraceWriter};
