//! Run-level failures.
//!
//! Only these surface to the operator. Anything that goes wrong for a single
//! target is folded into the result set instead.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScanError {
    /// Malformed prefix or port list, invalid rate, empty target set.
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested discovery backend is not registered.
    #[error("scanner not found: {0}")]
    ScannerNotFound(String),

    /// No route, no interface, no privileges, no capture device or no ARP reply.
    #[error("platform setup failed: {0}")]
    PlatformSetup(String),
}

impl ScanError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::PlatformSetup(msg.into())
    }
}
