use std::net::Ipv4Addr;
use std::str::FromStr;

use pnet::ipnetwork::Ipv4Network;

use crate::error::ScanError;

/// An IPv4 CIDR block.
///
/// Expansion is lazy: [`Prefix::iter`] walks the block from its masked base
/// address without ever materializing the full list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prefix {
    network: Ipv4Network,
}

impl Prefix {
    pub fn new(addr: Ipv4Addr, bits: u8) -> anyhow::Result<Self> {
        let network = Ipv4Network::new(addr, bits)?;
        Ok(Self { network })
    }

    /// The masked base address of the block.
    pub fn base(&self) -> Ipv4Addr {
        self.network.network()
    }

    pub fn bits(&self) -> u8 {
        self.network.prefix()
    }

    /// Number of addresses in the block, `2^(32 - bits)`.
    pub fn len(&self) -> u64 {
        1u64 << (32 - u32::from(self.bits()))
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> PrefixIter {
        let start = u64::from(u32::from(self.base()));
        PrefixIter {
            next: start,
            end: start + self.len(),
        }
    }
}

impl FromStr for Prefix {
    type Err = ScanError;

    /// Parses `a.b.c.d/n`. A bare address is treated as `/32`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr_str, bits_str) = s.split_once('/').unwrap_or((s, "32"));

        let addr = addr_str
            .parse::<Ipv4Addr>()
            .map_err(|e| ScanError::config(format!("invalid IPv4 address in prefix '{s}': {e}")))?;

        let bits = bits_str
            .parse::<u8>()
            .map_err(|e| ScanError::config(format!("invalid prefix length in '{s}': {e}")))?;

        Prefix::new(addr, bits).map_err(|e| ScanError::config(format!("invalid prefix '{s}': {e}")))
    }
}

impl std::fmt::Display for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base(), self.bits())
    }
}

impl IntoIterator for &Prefix {
    type Item = Ipv4Addr;
    type IntoIter = PrefixIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending walk over the addresses of a [`Prefix`].
#[derive(Debug, Clone)]
pub struct PrefixIter {
    next: u64,
    end: u64,
}

impl Iterator for PrefixIter {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let addr = Ipv4Addr::from(self.next as u32);
        self.next += 1;
        Some(addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PrefixIter {}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
