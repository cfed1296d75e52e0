use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Fallback variable consulted when `RUST_LOG` is unset.
pub const LOG_ENV: &str = "SSH_PASS_SCAN_LOG";

/// Install a stderr `tracing` subscriber. stdout is reserved for scan output.
///
/// russh reports every failed handshake loudly; those are expected here, so
/// it is held at `error` unless the filter names it explicitly.
pub fn init() -> Result<()> {
    let directives = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var(LOG_ENV))
        .unwrap_or_else(|_| "warn".to_string());
    let filter = EnvFilter::new(filter_directives(&directives));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

fn filter_directives(base: &str) -> String {
    if base.contains("russh") {
        base.to_string()
    } else {
        format!("{base},russh=error")
    }
}
