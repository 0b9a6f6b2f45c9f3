// JobRunnerSettings: runner configuration loaded from a JSON file and/or
// environment variables.

use crate::constants::{variables, DEFAULT_TIMEOUT};

use anyhow::{Context, Result};
use job_runner_sdk::StringUtil;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_handle_signals() -> bool {
    true
}

/// Configuration for a `JobRunner`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobRunnerSettings {
    /// Total time budget for a run, in seconds.
    #[serde(default = "default_timeout_seconds", rename = "TimeoutSeconds")]
    pub timeout_seconds: u64,

    /// Whether SIGINT / SIGTERM interrupt the run. When false the runner can
    /// only time out or succeed.
    #[serde(default = "default_handle_signals", rename = "HandleSignals")]
    pub handle_signals: bool,
}

impl Default for JobRunnerSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            handle_signals: default_handle_signals(),
        }
    }
}

impl JobRunnerSettings {
    /// Load settings from a JSON file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {:?}", path))?;
        let settings: JobRunnerSettings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {:?}", path))?;
        Ok(settings)
    }

    /// Apply `JOB_RUNNER_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are
    /// ignored with a warning and the current value is kept.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(variables::TIMEOUT_SECONDS) {
            match StringUtil::convert_to_seconds(&raw) {
                Some(seconds) => self.timeout_seconds = seconds,
                None => tracing::warn!(
                    "Ignoring invalid {} value '{}'",
                    variables::TIMEOUT_SECONDS,
                    raw
                ),
            }
        }

        if let Some(raw) = lookup(variables::HANDLE_SIGNALS) {
            match StringUtil::convert_to_bool(&raw) {
                Some(enabled) => self.handle_signals = enabled,
                None => tracing::warn!(
                    "Ignoring invalid {} value '{}'",
                    variables::HANDLE_SIGNALS,
                    raw
                ),
            }
        }
    }

    /// The run's time budget.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}
