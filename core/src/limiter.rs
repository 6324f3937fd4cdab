//! Token bucket pacing probe emission.
//!
//! A thin wrapper over a direct `governor` limiter: the quota refills at the
//! configured rate and lets `rate / 200` probes go back to back. Waiting is
//! raced against the run's cancellation token, and an abandoned wait consumes
//! nothing.

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota};
use sockscan_common::config::Rate;
use sockscan_common::info;
use tokio_util::sync::CancellationToken;

/// Tokens that may be spent back to back are `rate / BURST_DIVISOR`.
const BURST_DIVISOR: u32 = 200;

pub struct RateLimiter {
    inner: Option<DefaultDirectRateLimiter>,
}

impl RateLimiter {
    pub fn new(rate: Rate) -> Self {
        let inner = match rate {
            Rate::Unlimited => {
                info!("rate unlimited mode");
                None
            }
            Rate::Limited(per_second) => {
                info!("rate {per_second}/s");
                let quota = Quota::per_second(per_second).allow_burst(burst_for(per_second));
                Some(governor::RateLimiter::direct(quota))
            }
        };
        Self { inner }
    }

    /// Waits for one token.
    ///
    /// Returns `false` if `cancel` fires first (or already has), in which
    /// case the caller must not emit its probe.
    pub async fn acquire(&self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        let Some(limiter) = &self.inner else {
            return true;
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = limiter.until_ready() => true,
        }
    }
}

pub(crate) fn burst_for(per_second: NonZeroU32) -> NonZeroU32 {
    NonZeroU32::new(per_second.get() / BURST_DIVISOR).unwrap_or(NonZeroU32::MIN)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
