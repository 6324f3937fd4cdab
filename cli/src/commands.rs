pub mod scan;

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use sockscan_common::config::{
    DEFAULT_BACKEND, DEFAULT_PORTS, DEFAULT_PROBE_WORKERS, DEFAULT_TEST_URL, Rate, ScanConfig,
};
use sockscan_common::error::ScanError;
use sockscan_common::network::target::{self, Targets};

#[derive(Parser, Debug)]
#[command(name = "sockscan")]
#[command(version, about = "Finds open SOCKS5 proxies across IPv4 prefixes.")]
pub struct CommandLine {
    /// IPv4 prefixes to sweep, comma separated; a bare address means /32
    #[arg(long)]
    pub prefix: String,

    /// Ports to try on every address, e.g. 1080,7890-7893
    #[arg(long, default_value = DEFAULT_PORTS)]
    pub port: String,

    /// URL fetched through each candidate proxy
    #[arg(long, default_value = DEFAULT_TEST_URL)]
    pub url: String,

    /// Liveness backend: "system" (TCP connect) or "pcap" (raw SYN, needs root)
    #[arg(long, default_value = DEFAULT_BACKEND)]
    pub backend: String,

    /// Shorthand for --backend pcap
    #[arg(long, conflicts_with = "backend")]
    pub pcap: bool,

    /// Probes per second, -1 for unlimited
    #[arg(long, default_value = "3000", allow_hyphen_values = true)]
    pub rate: Rate,

    /// Seconds allowed for each of the HTTP and UDP checks
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,

    /// Concurrent SOCKS5 verifications
    #[arg(long, default_value_t = DEFAULT_PROBE_WORKERS)]
    pub workers: usize,

    /// Also write the verified proxies to this file
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn backend(&self) -> &str {
        if self.pcap { "pcap" } else { &self.backend }
    }

    pub fn to_config(&self) -> Result<ScanConfig, ScanError> {
        let targets = Targets::new(
            target::parse_prefixes(&self.prefix)?,
            target::parse_ports(&self.port)?,
        );
        let cfg = ScanConfig {
            targets,
            test_url: self.url.clone(),
            rate: self.rate,
            backend: self.backend().to_string(),
            probe_timeout: Duration::from_secs(self.timeout),
            probe_workers: self.workers,
            ..Default::default()
        };
        cfg.validate()?;
        Ok(cfg)
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
