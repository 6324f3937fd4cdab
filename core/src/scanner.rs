//! Liveness discovery backends.
//!
//! Every backend follows the same lifecycle: the orchestrator takes the
//! alive stream once, feeds targets through [`Discovery::send`] and finally
//! calls [`Discovery::end`], after which the stream closes. Backends are
//! picked by name through a [`ScannerRegistry`] assembled once at startup.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sockscan_common::config::ScanConfig;
use sockscan_common::error::ScanError;
use sockscan_common::network::AddressPort;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod connect;
#[cfg(any(target_os = "linux", target_os = "macos"))]
pub mod raw;

pub use connect::ConnectScanner;
#[cfg(any(target_os = "linux", target_os = "macos"))]
pub use raw::RawScanner;

/// Capacity of every backend's alive stream.
pub const ALIVE_BUFFER: usize = 1024;

pub type AliveStream = mpsc::Receiver<AddressPort>;

#[async_trait]
pub trait Discovery: Send {
    /// Emits one liveness probe, blocking on the rate limiter first.
    ///
    /// Abandoned silently if the run is cancelled while waiting. Calling this
    /// after [`Discovery::end`] is logged and ignored.
    async fn send(&mut self, target: AddressPort);

    /// Hands out the stream of targets found to accept TCP. Only the first call returns it.
    fn alive(&mut self) -> Option<AliveStream>;

    /// Waits for outstanding probes to resolve and closes the alive stream.
    async fn end(&mut self);
}

/// The closed set of backends the registry can build.
pub enum Scanner {
    Connect(ConnectScanner),
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    Raw(RawScanner),
}

#[async_trait]
impl Discovery for Scanner {
    async fn send(&mut self, target: AddressPort) {
        match self {
            Scanner::Connect(s) => s.send(target).await,
            #[cfg(any(target_os = "linux", target_os = "macos"))]
            Scanner::Raw(s) => s.send(target).await,
        }
    }

    fn alive(&mut self) -> Option<AliveStream> {
        match self {
            Scanner::Connect(s) => s.alive(),
            #[cfg(any(target_os = "linux", target_os = "macos"))]
            Scanner::Raw(s) => s.alive(),
        }
    }

    async fn end(&mut self) {
        match self {
            Scanner::Connect(s) => s.end().await,
            #[cfg(any(target_os = "linux", target_os = "macos"))]
            Scanner::Raw(s) => s.end().await,
        }
    }
}

/// Builds one backend for a run.
#[async_trait]
pub trait ScannerFactory: Send + Sync {
    async fn build(&self, cfg: &ScanConfig, cancel: CancellationToken) -> anyhow::Result<Scanner>;
}

pub struct ConnectFactory;

#[async_trait]
impl ScannerFactory for ConnectFactory {
    async fn build(&self, cfg: &ScanConfig, cancel: CancellationToken) -> anyhow::Result<Scanner> {
        Ok(Scanner::Connect(ConnectScanner::new(cfg, cancel)))
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
pub struct RawFactory;

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[async_trait]
impl ScannerFactory for RawFactory {
    async fn build(&self, cfg: &ScanConfig, cancel: CancellationToken) -> anyhow::Result<Scanner> {
        Ok(Scanner::Raw(RawScanner::new(cfg, cancel).await?))
    }
}

/// Name to factory table.
#[derive(Default)]
pub struct ScannerRegistry {
    factories: BTreeMap<String, Box<dyn ScannerFactory>>,
}

impl ScannerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `system` (alias `connect`) everywhere, `pcap` (alias `raw`) where raw capture is supported.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("system", ConnectFactory);
        registry.register("connect", ConnectFactory);
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            registry.register("pcap", RawFactory);
            registry.register("raw", RawFactory);
        }
        registry
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: &str, factory: impl ScannerFactory + 'static) {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub async fn build(&self, name: &str, cfg: &ScanConfig, cancel: CancellationToken) -> anyhow::Result<Scanner> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ScanError::ScannerNotFound(name.to_string()))?;
        factory.build(cfg, cancel).await
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
