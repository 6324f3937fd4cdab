//! The three-stage scan pipeline.
//!
//! 1. **Generate**: walk every address of every prefix and hand each
//!    (address, port) pair to the discovery backend, logging progress.
//! 2. **Discover**: collect the backend's alive stream until `end` closes it.
//! 3. **Verify**: run the SOCKS5 prober over the alive set on a worker pool.
//!
//! Stage 2 drains concurrently with stage 1; stage 3 starts only once the
//! alive set is complete. Cancelling the run token stops generation, lets
//! the backend wind down and skips whatever verification has not started.

use std::time::Duration;

use anyhow::Context;
use sockscan_common::config::ScanConfig;
use sockscan_common::network::AddressPort;
use sockscan_common::network::target::Targets;
use sockscan_common::{debug, info, success, warn};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::collector::Collector;
use crate::pool::WorkerPool;
use crate::prober::{ProbeResult, Socks5Prober};
use crate::scanner::{Discovery, ScannerRegistry};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(3);

/// Outcome of one run.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Every endpoint that completed a TCP handshake, in discovery order.
    pub alive: Vec<AddressPort>,
    /// One entry per verified endpoint, in completion order.
    pub results: Vec<ProbeResult>,
    pub interrupted: bool,
}

impl ScanReport {
    pub fn proxies(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|r| r.success)
    }
}

pub struct Orchestrator<'a> {
    cfg: ScanConfig,
    registry: &'a ScannerRegistry,
    prober: Socks5Prober,
    cancel: CancellationToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(cfg: ScanConfig, registry: &'a ScannerRegistry, cancel: CancellationToken) -> Self {
        let prober = Socks5Prober::new(cfg.test_url.clone(), cfg.probe_timeout);
        Self {
            cfg,
            registry,
            prober,
            cancel,
        }
    }

    /// Replaces the default prober, e.g. to point the UDP check at another resolver.
    pub fn with_prober(mut self, prober: Socks5Prober) -> Self {
        self.prober = prober;
        self
    }

    pub async fn run(&self) -> anyhow::Result<ScanReport> {
        self.cfg.validate()?;

        let mut scanner = self
            .registry
            .build(&self.cfg.backend, &self.cfg, self.cancel.clone())
            .await
            .with_context(|| format!("starting {} scanner", self.cfg.backend))?;
        let alive_stream = scanner.alive().context("alive stream already taken")?;
        let discovered = Collector::from_receiver(alive_stream);

        generate(&mut scanner, &self.cfg.targets, &self.cancel).await;
        scanner.end().await;
        let alive = discovered.finish().await;
        info!("tcp scan done, {} alive", alive.len());

        let results = self.verify(&alive).await;
        info!("socks5 scan done");

        Ok(ScanReport {
            alive,
            results,
            interrupted: self.cancel.is_cancelled(),
        })
    }

    async fn verify(&self, alive: &[AddressPort]) -> Vec<ProbeResult> {
        let workers = self.cfg.probe_workers;
        info!("start socks5 scan with {workers} workers");

        let mut pool = WorkerPool::new(workers, workers);
        let collector = Collector::new();

        for &addr in alive {
            let Some(results) = collector.sender() else { break };
            let prober = self.prober.clone();
            let task = async move {
                let result = prober.probe(addr).await;
                if result.success {
                    success!("Found {addr} socks5 alive (udp: {})", result.udp_capable);
                }
                if results.send(result).await.is_err() {
                    debug!("collector closed, dropping result for {addr}");
                }
            };
            let queued = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => false,
                queued = pool.submit(task) => queued,
            };
            if !queued {
                break;
            }
        }

        let interrupted = tokio::select! {
            _ = pool.join() => false,
            _ = self.cancel.cancelled() => true,
        };
        if interrupted {
            warn!("interrupted, abandoning pending verifications");
            pool.close().await;
        }
        collector.finish().await
    }
}

/// Feeds every target pair to `scanner`. Returns the number of addresses walked.
async fn generate<D: Discovery + ?Sized>(scanner: &mut D, targets: &Targets, cancel: &CancellationToken) -> u64 {
    let total = targets.address_count();
    let mut walked: u64 = 0;
    let mut next_report = Instant::now() + PROGRESS_INTERVAL;

    for addr in targets.addresses() {
        if cancel.is_cancelled() {
            warn!("interrupted, stopping target generation");
            break;
        }
        for &port in &targets.ports {
            scanner.send(AddressPort::new(addr, port)).await;
        }
        walked += 1;

        if Instant::now() >= next_report {
            info!("Generator {:.2}%", progress_percent(walked, total));
            next_report = Instant::now() + PROGRESS_INTERVAL;
        }
    }
    walked
}

fn progress_percent(walked: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    walked as f64 / total as f64 * 100.0
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
