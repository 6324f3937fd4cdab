use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ScanError;
use crate::network::target::Targets;

pub const DEFAULT_TEST_URL: &str = "http://www.gstatic.com/generate_204";
pub const DEFAULT_PORTS: &str = "10808,10809,20170-20172,7890-7893";
pub const DEFAULT_BACKEND: &str = "system";
pub const DEFAULT_RATE: u32 = 3000;
pub const DEFAULT_PROBE_WORKERS: usize = 128;

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(5);

/// Value accepted on the command line to lift the rate limit.
pub const UNLIMITED_SENTINEL: i64 = -1;

/// Outbound probe rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rate {
    /// At most this many probes per second.
    Limited(NonZeroU32),
    Unlimited,
}

impl Rate {
    pub fn per_second(&self) -> Option<u32> {
        match self {
            Rate::Limited(r) => Some(r.get()),
            Rate::Unlimited => None,
        }
    }
}

impl Default for Rate {
    fn default() -> Self {
        match NonZeroU32::new(DEFAULT_RATE) {
            Some(r) => Rate::Limited(r),
            None => Rate::Unlimited,
        }
    }
}

impl TryFrom<i64> for Rate {
    type Error = ScanError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value == UNLIMITED_SENTINEL {
            return Ok(Rate::Unlimited);
        }
        u32::try_from(value)
            .ok()
            .and_then(NonZeroU32::new)
            .map(Rate::Limited)
            .ok_or_else(|| ScanError::config(format!("rate must be -1 or >0, got {value}")))
    }
}

impl FromStr for Rate {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<i64>()
            .map_err(|e| ScanError::config(format!("invalid rate '{s}': {e}")))?;
        Rate::try_from(value)
    }
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rate::Limited(r) => write!(f, "{r}/s"),
            Rate::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// Everything a scan run needs, already parsed and validated by the caller.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub targets: Targets,
    /// URL fetched through each candidate proxy.
    pub test_url: String,
    pub rate: Rate,
    /// Name of the discovery backend, looked up in the scanner registry.
    pub backend: String,
    /// Connect timeout of the connect-based backend.
    pub dial_timeout: Duration,
    /// Budget for the HTTP check and, separately, for the UDP check.
    pub probe_timeout: Duration,
    /// How long a raw SYN probe waits for its SYN-ACK.
    pub pending_ttl: Duration,
    pub probe_workers: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            targets: Targets::default(),
            test_url: DEFAULT_TEST_URL.to_string(),
            rate: Rate::default(),
            backend: DEFAULT_BACKEND.to_string(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            pending_ttl: DEFAULT_PENDING_TTL,
            probe_workers: DEFAULT_PROBE_WORKERS,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ScanError> {
        self.targets.validate()?;
        if self.probe_workers == 0 {
            return Err(ScanError::config("probe worker count must be >0"));
        }
        if self.test_url.trim().is_empty() {
            return Err(ScanError::config("test url is empty"));
        }
        Ok(())
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
