// Process-wide `tracing` subscriber setup for programs that embed the runner.

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` is honoured; `default_level` is added as a directive on top of
/// it. Fails instead of panicking when a global subscriber already exists.
pub fn init_tracing(default_level: Level) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(default_level))
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}

fn build_filter(default_level: Level) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(default_level.into())
}
