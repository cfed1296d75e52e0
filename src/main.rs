use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ssh_pass_scan::probe::{ProbeConfig, DEFAULT_USERNAME};
use ssh_pass_scan::report::{self, OutputMode};
use ssh_pass_scan::scanner::ScanOptions;
use ssh_pass_scan::transport::RusshNegotiator;
use ssh_pass_scan::types::ScanResults;
use ssh_pass_scan::{logging, targets};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

/// ssh-pass-scan — find SSH servers that accept password authentication without logging in.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ssh-pass-scan",
    version,
    about = "Find SSH servers that accept password authentication, without sending credentials.",
    long_about = None
)]
struct Cli {
    /// CIDRs/IPs separated by commas, or path to a file with one per line. If omitted, auto-detect local /24.
    #[arg(long)]
    targets: Option<String>,

    /// SSH port to probe on every host.
    #[arg(long, default_value_t = 22)]
    port: u16,

    /// Max concurrent probes.
    #[arg(long, default_value_t = 100)]
    concurrency: usize,

    /// Connect, handshake and auth-query timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 2000)]
    timeout_ms: u64,

    /// Username sent with the credential-less auth attempt.
    #[arg(long, default_value = DEFAULT_USERNAME)]
    username: String,

    /// Print one tab-separated line per finding instead of pretty output.
    #[arg(long, default_value_t = false)]
    machine: bool,

    /// Also write every probe outcome as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init()?;

    let mode = if cli.machine {
        OutputMode::Machine
    } else {
        OutputMode::Pretty
    };

    let hosts = match cli.targets.as_deref() {
        Some(arg) => targets::load_targets(arg)?,
        None => {
            let cidrs = targets::detect_local_cidrs().context("failed to detect local networks")?;
            let mut hosts = Vec::new();
            for cidr in cidrs {
                info!(%cidr, "scanning detected local network");
                hosts.extend(targets::expand_cidr_to_ips(cidr)?);
            }
            hosts
        }
    };
    if hosts.is_empty() {
        warn!("no targets to scan");
    }
    let targets = targets::with_port(&hosts, cli.port);

    let opts = ScanOptions {
        concurrency: cli.concurrency,
        probe: ProbeConfig {
            timeout: Duration::from_millis(cli.timeout_ms),
            username: cli.username,
        },
        ..ScanOptions::default()
    };

    let out = Arc::new(Mutex::new(std::io::stdout()));
    let results = report::run(&targets, &opts, Arc::new(RusshNegotiator), mode, out).await?;

    if let Some(path) = cli.output.as_deref() {
        write_results_json(path, &results)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        info!(path = %path.display(), "wrote JSON results");
    }

    Ok(())
}

fn write_results_json(path: &std::path::Path, results: &ScanResults) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, results)?;
    Ok(())
}
