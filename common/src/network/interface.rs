//! Egress route discovery for the raw backend.
//!
//! The raw scanner writes whole Ethernet frames, so it needs to know which
//! interface reaches the internet, which address it speaks from and which
//! gateway sits on the other side of the link.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use pnet::datalink::{self, NetworkInterface};
use pnet::util::MacAddr;

use crate::error::ScanError;
use crate::utils::interface::NetworkInterfaceExtension;

/// Public address used only to let the kernel pick a route. Nothing is sent to it.
pub const ROUTE_PROBE_ADDR: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);

/// Linux `RTF_GATEWAY`.
const RTF_GATEWAY: u32 = 0x2;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ViabilityError {
    /// The interface is operationally down.
    IsDown,
    /// Loopback cannot reach a gateway.
    IsLoopback,
    /// Frames cannot be addressed without a hardware address.
    NoMacAddress,
    /// The kernel's chosen source address does not live on this interface.
    NotOwner,
}

/// The link-level route used for every raw probe.
#[derive(Debug, Clone)]
pub struct EgressRoute {
    pub interface: NetworkInterface,
    pub source_ip: Ipv4Addr,
    pub source_mac: MacAddr,
    pub gateway: Ipv4Addr,
}

/// Finds the interface, source address and gateway the kernel uses for public traffic.
pub fn resolve_egress_route() -> Result<EgressRoute, ScanError> {
    let source_ip = resolve_route_source_ip(ROUTE_PROBE_ADDR)
        .ok_or_else(|| ScanError::platform("no default route found"))?;

    let interface = select_egress_interface(datalink::interfaces(), source_ip)?;

    let source_mac = interface
        .mac
        .ok_or_else(|| ScanError::platform(format!("{} has no hardware address", interface.name)))?;

    let gateway = default_gateway(&interface.name).ok_or_else(|| {
        ScanError::platform(format!("no default gateway found on {}", interface.name))
    })?;

    Ok(EgressRoute {
        interface,
        source_ip,
        source_mac,
        gateway,
    })
}

fn select_egress_interface(
    interfaces: Vec<NetworkInterface>,
    source_ip: Ipv4Addr,
) -> Result<NetworkInterface, ScanError> {
    let mut last_reason: Option<(String, ViabilityError)> = None;

    for interface in interfaces {
        match is_viable_egress_interface(&interface, source_ip) {
            Ok(()) => return Ok(interface),
            Err(ViabilityError::NotOwner) => {}
            Err(reason) => last_reason = Some((interface.name.clone(), reason)),
        }
    }

    let msg = match last_reason {
        Some((name, reason)) => format!("interface {name} owning {source_ip} is unusable: {reason:?}"),
        None => format!("no interface owns source address {source_ip}"),
    };
    Err(ScanError::platform(msg))
}

fn is_viable_egress_interface(
    interface: &NetworkInterface,
    source_ip: Ipv4Addr,
) -> Result<(), ViabilityError> {
    if !interface.owns_ipv4(source_ip) {
        return Err(ViabilityError::NotOwner);
    }
    if !interface.is_up() {
        return Err(ViabilityError::IsDown);
    }
    if interface.is_loopback() {
        return Err(ViabilityError::IsLoopback);
    }
    if interface.mac.is_none_or(|mac| mac == MacAddr::zero()) {
        return Err(ViabilityError::NoMacAddress);
    }
    Ok(())
}

/// Asks the kernel which local address it would use to reach `target`.
///
/// Connecting a UDP socket sends nothing but fixes the route.
pub fn resolve_route_source_ip(target: Ipv4Addr) -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((target, 53)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(v4) if !v4.is_unspecified() => Some(v4),
        _ => None,
    }
}

/// Reads the default gateway for `iface_name` from the OS routing table.
pub fn default_gateway(iface_name: &str) -> Option<Ipv4Addr> {
    #[cfg(target_os = "linux")]
    {
        linux_impl::default_gateway(iface_name)
    }
    #[cfg(target_os = "macos")]
    {
        macos_impl::default_gateway(iface_name)
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = iface_name;
        None
    }
}

/// Parses the contents of `/proc/net/route`.
///
/// Addresses are printed as the raw in-memory `u32`, so the native byte order
/// recovers the network-order octets.
pub fn parse_proc_net_route(contents: &str, iface_name: &str) -> Option<Ipv4Addr> {
    let mut fallback: Option<Ipv4Addr> = None;

    for line in contents.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 {
            continue;
        }
        let (name, dest, gateway, flags, mask) = (fields[0], fields[1], fields[2], fields[3], fields[7]);

        let Ok(dest) = u32::from_str_radix(dest, 16) else { continue };
        let Ok(mask) = u32::from_str_radix(mask, 16) else { continue };
        let Ok(flags) = u32::from_str_radix(flags, 16) else { continue };
        let Ok(gateway) = u32::from_str_radix(gateway, 16) else { continue };

        if dest != 0 || mask != 0 || flags & RTF_GATEWAY == 0 {
            continue;
        }

        let gateway = Ipv4Addr::from(gateway.to_ne_bytes());
        if name == iface_name {
            return Some(gateway);
        }
        fallback.get_or_insert(gateway);
    }

    fallback
}

/// Parses the output of `route -n get default`.
pub fn parse_route_get(output: &str) -> Option<Ipv4Addr> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix("gateway:")
            .and_then(|gw| gw.trim().parse::<Ipv4Addr>().ok())
    })
}

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;

    pub fn default_gateway(iface_name: &str) -> Option<Ipv4Addr> {
        let contents = std::fs::read_to_string("/proc/net/route").ok()?;
        parse_proc_net_route(&contents, iface_name)
    }
}

#[cfg(target_os = "macos")]
mod macos_impl {
    use super::*;
    use std::process::Command;

    pub fn default_gateway(_iface_name: &str) -> Option<Ipv4Addr> {
        let output = Command::new("route").args(["-n", "get", "default"]).output().ok()?;
        if !output.status.success() {
            return None;
        }
        parse_route_get(&String::from_utf8_lossy(&output.stdout))
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
