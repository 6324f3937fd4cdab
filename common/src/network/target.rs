//! # Scan Target Model
//!
//! Parses the operator's target description into prefixes and ports.
//!
//! Supported inputs:
//! * Prefix lists: `1.2.3.0/24,10.0.0.1` (a bare address means `/32`).
//! * Port lists: `10808,10809,20170-20172` (ranges are inclusive).

use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::ScanError;
use crate::network::range::Prefix;

/// The cartesian product of a set of prefixes and a set of ports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets {
    pub prefixes: Vec<Prefix>,
    pub ports: Vec<u16>,
}

impl Targets {
    pub fn new(prefixes: Vec<Prefix>, ports: Vec<u16>) -> Self {
        Self { prefixes, ports }
    }

    /// Total number of addresses across all prefixes.
    pub fn address_count(&self) -> u64 {
        self.prefixes.iter().map(Prefix::len).sum()
    }

    /// Lazily walks every address, in prefix order.
    pub fn addresses(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.prefixes.iter().flat_map(Prefix::iter)
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if self.prefixes.is_empty() {
            return Err(ScanError::config("no prefix given"));
        }
        if self.ports.is_empty() {
            return Err(ScanError::config("no port given"));
        }
        Ok(())
    }
}

/// Parses a comma-separated list of prefixes.
pub fn parse_prefixes(s: &str) -> Result<Vec<Prefix>, ScanError> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(Prefix::from_str)
        .collect()
}

/// Parses a comma-separated list of ports and inclusive port ranges.
pub fn parse_ports(s: &str) -> Result<Vec<u16>, ScanError> {
    let mut ports: Vec<u16> = Vec::new();

    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        match part.split_once('-') {
            Some((start_str, end_str)) => {
                let start = parse_port(start_str, part)?;
                let end = parse_port(end_str, part)?;
                if start > end {
                    return Err(ScanError::config(format!("port range '{part}' is reversed")));
                }
                ports.extend(start..=end);
            }
            None => ports.push(parse_port(part, part)?),
        }
    }

    Ok(ports)
}

fn parse_port(s: &str, original: &str) -> Result<u16, ScanError> {
    s.trim()
        .parse::<u16>()
        .map_err(|e| ScanError::config(format!("invalid port '{s}' in '{original}': {e}")))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
