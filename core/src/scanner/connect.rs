//! Liveness by full TCP connect through the operating system's stack.
//!
//! Needs no privileges. Each probe is a dial with a short timeout running on
//! a worker pool sized to the configured rate, so roughly one second worth of
//! probes can be in flight at once.

use std::time::Duration;

use async_trait::async_trait;
use sockscan_common::config::ScanConfig;
use sockscan_common::network::AddressPort;
use sockscan_common::{debug, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{ALIVE_BUFFER, AliveStream, Discovery};
use crate::limiter::RateLimiter;
use crate::network::tcp;
use crate::pool::WorkerPool;

/// Upper bound on concurrent dials, also used when the rate is unlimited.
pub const MAX_CONNECT_WORKERS: usize = 10_000;

pub struct ConnectScanner {
    limiter: RateLimiter,
    pool: WorkerPool,
    dial_timeout: Duration,
    alive_tx: Option<mpsc::Sender<AddressPort>>,
    alive_rx: Option<AliveStream>,
    cancel: CancellationToken,
}

impl ConnectScanner {
    pub fn new(cfg: &ScanConfig, cancel: CancellationToken) -> Self {
        let workers = worker_count(cfg);
        debug!("connect scanner with {workers} workers");
        let (alive_tx, alive_rx) = mpsc::channel(ALIVE_BUFFER);
        Self {
            limiter: RateLimiter::new(cfg.rate),
            pool: WorkerPool::new(workers, workers),
            dial_timeout: cfg.dial_timeout,
            alive_tx: Some(alive_tx),
            alive_rx: Some(alive_rx),
            cancel,
        }
    }
}

fn worker_count(cfg: &ScanConfig) -> usize {
    cfg.rate
        .per_second()
        .map_or(MAX_CONNECT_WORKERS, |r| (r as usize).min(MAX_CONNECT_WORKERS))
}

#[async_trait]
impl Discovery for ConnectScanner {
    async fn send(&mut self, target: AddressPort) {
        let Some(alive_tx) = self.alive_tx.clone() else {
            warn!("calling send after end is not allowed");
            return;
        };
        if !self.limiter.acquire(&self.cancel).await {
            return;
        }

        let dial_timeout = self.dial_timeout;
        let dial = async move {
            if tcp::handshake_probe(target, dial_timeout).await {
                debug!("{target} alive");
                if alive_tx.send(target).await.is_err() {
                    debug!("alive stream closed, dropping {target}");
                }
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            _ = self.pool.submit(dial) => {}
        }
    }

    fn alive(&mut self) -> Option<AliveStream> {
        self.alive_rx.take()
    }

    async fn end(&mut self) {
        if self.alive_tx.take().is_none() {
            return;
        }
        self.pool.join().await;
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
