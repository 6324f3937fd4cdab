//! The scanning engine.
//!
//! [`orchestrator`] drives the three pipeline stages on top of a
//! [`scanner::Discovery`] backend, the [`prober::Socks5Prober`] and the
//! concurrency primitives that live next to them.

pub mod collector;
pub mod limiter;
pub mod orchestrator;
pub mod pending;
pub mod pool;
pub mod prober;
pub mod scanner;

mod network;

pub use orchestrator::{Orchestrator, ScanReport};
pub use prober::{ProbeResult, Socks5Prober};
pub use scanner::{Discovery, Scanner, ScannerFactory, ScannerRegistry};
