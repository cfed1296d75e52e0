use crate::scanner::{scan_targets_with_progress, scan_targets, ProgressObserver, ScanOptions};
use crate::transport::SshNegotiator;
use crate::types::{ProbeOutcome, ScanResults, Target};
use anyhow::{anyhow, Result};
use std::io::Write;
use std::sync::{Arc, Mutex};
use ::time::{format_description::well_known, OffsetDateTime};

/// Finding kind written in the third machine-output column.
pub const FINDING_KIND: &str = "password-ssh";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Live progress, annotated findings and a summary line.
    #[default]
    Pretty,
    /// One tab-separated record per finding and nothing else.
    Machine,
}

pub fn progress_line(done: u64, total: u64) -> String {
    format!("\rProgress: {done}/{total}")
}

pub fn finding_line(outcome: &ProbeOutcome) -> String {
    format!(
        "🚨 {}:{} allows password authentication",
        outcome.target.ip, outcome.target.port
    )
}

pub fn machine_line(outcome: &ProbeOutcome, timestamp: &str) -> String {
    format!(
        "{timestamp}\t{}\t{FINDING_KIND}\t{}",
        outcome.target.ip, outcome.target.port
    )
}

pub fn summary_line(results: &ScanResults) -> String {
    format!(
        "Total hosts/checks: {}/{}",
        results.scanned_total, results.scanned_done
    )
}

/// RFC 3339 UTC timestamp.
pub fn timestamp(now: OffsetDateTime) -> String {
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

/// Write every positive finding in `results`, sorted by target, followed by the
/// summary line in pretty mode.
pub fn write_findings<W: Write + ?Sized>(
    out: &mut W,
    results: &ScanResults,
    mode: OutputMode,
    now: OffsetDateTime,
) -> Result<()> {
    let mut findings: Vec<&ProbeOutcome> = results.findings().collect();
    findings.sort_by_key(|o| o.target);
    let ts = timestamp(now);
    for outcome in findings {
        match mode {
            OutputMode::Pretty => writeln!(out, "{}", finding_line(outcome))?,
            OutputMode::Machine => writeln!(out, "{}", machine_line(outcome, &ts))?,
        }
    }
    if mode == OutputMode::Pretty {
        writeln!(out, "{}", summary_line(results))?;
    }
    out.flush()?;
    Ok(())
}

/// Scan `targets` and write the run's output to `out`.
///
/// In pretty mode the progress line is rewritten in place while probes run and
/// once more after they all join. Findings are written only after the join.
pub async fn run<W>(
    targets: &[Target],
    opts: &ScanOptions,
    negotiator: Arc<dyn SshNegotiator>,
    mode: OutputMode,
    out: Arc<Mutex<W>>,
) -> Result<ScanResults>
where
    W: Write + Send + 'static,
{
    let results = match mode {
        OutputMode::Pretty => {
            let sink = out.clone();
            let observer: ProgressObserver = Arc::new(move |done: u64, total: u64| {
                if let Ok(mut w) = sink.lock() {
                    let _ = write!(w, "{}", progress_line(done, total));
                    let _ = w.flush();
                }
            });
            scan_targets_with_progress(targets, opts, negotiator, observer).await?
        }
        OutputMode::Machine => scan_targets(targets, opts, negotiator).await?,
    };

    let mut w = out.lock().map_err(|_| anyhow!("output writer poisoned"))?;
    if mode == OutputMode::Pretty {
        writeln!(w)?;
    }
    write_findings(&mut *w, &results, mode, OffsetDateTime::now_utc())?;
    Ok(results)
}
