use crate::probe::{probe, ProbeConfig};
use crate::transport::SshNegotiator;
use crate::types::{ProbeOutcome, ScanResults, Target};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Called with `(done, total)` while a scan runs, and once more after it joins.
pub type ProgressObserver = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Max probes in flight. Clamped to `1..=5000`.
    pub concurrency: usize,
    pub probe: ProbeConfig,
    pub progress_interval: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            concurrency: 100,
            probe: ProbeConfig::default(),
            progress_interval: Duration::from_secs(1),
        }
    }
}

/// Per-run state touched by every worker: the completed-probe counter and the
/// result sink. Clone it to observe a scan from outside.
#[derive(Clone, Debug)]
pub struct SharedProgress {
    pub scanned_done: Arc<AtomicU64>,
    pub outcomes: Arc<Mutex<Vec<ProbeOutcome>>>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self {
            scanned_done: Arc::new(AtomicU64::new(0)),
            outcomes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn done(&self) -> u64 {
        self.scanned_done.load(Ordering::Acquire)
    }
}

impl Default for SharedProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Probe every target once with bounded concurrency and return all outcomes.
///
/// - Limits in-flight probes using a `Semaphore`; extra targets wait for a permit.
/// - Returns only after every spawned probe has joined.
pub async fn scan_targets(
    targets: &[Target],
    opts: &ScanOptions,
    negotiator: Arc<dyn SshNegotiator>,
) -> Result<ScanResults> {
    scan_targets_internal(targets, opts, negotiator, SharedProgress::new(), None).await
}

/// Variant that reports progress to `observer` every `progress_interval`.
pub async fn scan_targets_with_progress(
    targets: &[Target],
    opts: &ScanOptions,
    negotiator: Arc<dyn SshNegotiator>,
    observer: ProgressObserver,
) -> Result<ScanResults> {
    scan_targets_internal(targets, opts, negotiator, SharedProgress::new(), Some(observer)).await
}

/// Variant that accumulates into caller-owned state.
///
/// `shared` may be reused across runs: progress is reported relative to its
/// count at the start of this run, and the sink is drained when the run ends.
pub async fn scan_targets_with_shared(
    targets: &[Target],
    opts: &ScanOptions,
    negotiator: Arc<dyn SshNegotiator>,
    shared: SharedProgress,
    observer: Option<ProgressObserver>,
) -> Result<ScanResults> {
    scan_targets_internal(targets, opts, negotiator, shared, observer).await
}

async fn scan_targets_internal(
    targets: &[Target],
    opts: &ScanOptions,
    negotiator: Arc<dyn SshNegotiator>,
    shared: SharedProgress,
    observer: Option<ProgressObserver>,
) -> Result<ScanResults> {
    let total = targets.len() as u64;
    let concurrency = opts.concurrency.clamp(1, 5_000);
    info!(total, concurrency, "starting ssh password-auth scan");

    let base = shared.done();
    let joined = CancellationToken::new();
    let reporter = observer.clone().map(|obs| {
        let joined = joined.clone();
        let done = shared.scanned_done.clone();
        let period = opts.progress_interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = joined.cancelled() => break,
                    _ = ticker.tick() => {
                        let run_done = done.load(Ordering::Acquire).saturating_sub(base);
                        obs(run_done.min(total), total);
                    }
                }
            }
        })
    });

    let sem = Arc::new(Semaphore::new(concurrency));
    let cfg = Arc::new(opts.probe.clone());
    let mut set = JoinSet::new();

    for &target in targets {
        let permit = sem
            .clone()
            .acquire_owned()
            .await
            .context("scan semaphore closed")?;
        let cfg = cfg.clone();
        let negotiator = negotiator.clone();
        let shared = shared.clone();

        set.spawn(async move {
            let _permit = permit; // keep permit until task completes
            let outcome = probe(target, &cfg, negotiator.as_ref()).await;
            shared.outcomes.lock().await.push(outcome);
            // counted after the push so done == total implies a full sink
            shared.scanned_done.fetch_add(1, Ordering::AcqRel);
        });
    }

    // every joined task counts as completed, even one that panicked
    let mut scanned_done = 0u64;
    while let Some(res) = set.join_next().await {
        scanned_done += 1;
        if let Err(e) = res {
            warn!(error = %e, "probe task did not complete");
        }
    }

    joined.cancel();
    if let Some(handle) = reporter {
        let _ = handle.await;
    }

    if let Some(obs) = &observer {
        obs(scanned_done, total);
    }

    let outcomes = std::mem::take(&mut *shared.outcomes.lock().await);
    info!(
        scanned_done,
        findings = outcomes.iter().filter(|o| o.password_auth_allowed()).count(),
        "scan finished"
    );

    Ok(ScanResults {
        scanned_total: total,
        scanned_done,
        outcomes,
    })
}
