//! Stateless SYN probing.
//!
//! A probe is a complete Ethernet + IPv4 + TCP frame with only SYN set. The
//! answer of interest is a SYN-ACK, which is decoded back into the address
//! and port that produced it.

use std::net::Ipv4Addr;

use anyhow::Context;
use pnet::packet::Packet;
use pnet::packet::ethernet::EtherTypes;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Flags, Ipv4Packet, MutableIpv4Packet};
use pnet::packet::tcp::{self, MutableTcpPacket, TcpFlags, TcpPacket};
use pnet::util::MacAddr;

use sockscan_common::network::AddressPort;

use crate::{ETH_HDR_LEN, IPV4_HDR_LEN, TCP_HDR_LEN, ethernet};

pub const SYN_FRAME_LEN: usize = ETH_HDR_LEN + IPV4_HDR_LEN + TCP_HDR_LEN;

/// Frames longer than this cannot be a bare SYN-ACK and are skipped unparsed.
pub const MAX_SYN_ACK_FRAME_LEN: usize = 100;

const PROBE_TTL: u8 = 128;
const SRC_PORT_MIN: u16 = 10_000;
const WINDOW_MIN: u16 = 10_000;
const WINDOW_MAX: u16 = 20_000;

/// Addresses shared by every frame leaving the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkHeader {
    pub src_mac: MacAddr,
    /// Next hop, usually the default gateway.
    pub dst_mac: MacAddr,
    pub src_ip: Ipv4Addr,
}

/// Per-probe header values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynProbe {
    pub target: AddressPort,
    pub src_port: u16,
    pub seq: u32,
    pub window: u16,
    pub ip_id: u16,
}

impl SynProbe {
    /// Randomizes source port, sequence number, window and IP id.
    pub fn random(target: AddressPort) -> Self {
        Self {
            target,
            src_port: rand::random_range(SRC_PORT_MIN..=u16::MAX),
            seq: rand::random(),
            window: rand::random_range(WINDOW_MIN..WINDOW_MAX),
            ip_id: rand::random(),
        }
    }
}

/// A decoded SYN-ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynAck {
    /// The remote end that answered.
    pub source: AddressPort,
    pub destination: Ipv4Addr,
}

pub fn create_syn_frame(link: &LinkHeader, probe: &SynProbe) -> anyhow::Result<Vec<u8>> {
    let mut buffer: Vec<u8> = vec![0u8; SYN_FRAME_LEN];
    let dst_ip: Ipv4Addr = *probe.target.ip();

    ethernet::make_header(&mut buffer[..ETH_HDR_LEN], link.src_mac, link.dst_mac, EtherTypes::Ipv4)?;

    {
        let mut ip = MutableIpv4Packet::new(&mut buffer[ETH_HDR_LEN..ETH_HDR_LEN + IPV4_HDR_LEN])
            .context("creating ipv4 packet")?;
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_dscp(0);
        ip.set_ecn(0);
        ip.set_total_length((IPV4_HDR_LEN + TCP_HDR_LEN) as u16);
        ip.set_identification(probe.ip_id);
        ip.set_flags(Ipv4Flags::DontFragment);
        ip.set_fragment_offset(0);
        ip.set_ttl(PROBE_TTL);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Tcp);
        ip.set_source(link.src_ip);
        ip.set_destination(dst_ip);
        ip.set_checksum(0);
        let csm = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(csm);
    }

    {
        let mut tcp = MutableTcpPacket::new(&mut buffer[ETH_HDR_LEN + IPV4_HDR_LEN..])
            .context("creating tcp packet")?;
        tcp.set_source(probe.src_port);
        tcp.set_destination(probe.target.port());
        tcp.set_sequence(probe.seq);
        tcp.set_acknowledgement(0);
        tcp.set_data_offset(5);
        tcp.set_reserved(0);
        tcp.set_flags(TcpFlags::SYN);
        tcp.set_window(probe.window);
        tcp.set_urgent_ptr(0);
        tcp.set_checksum(0);
        let csm = tcp::ipv4_checksum(&tcp.to_immutable(), &link.src_ip, &dst_ip);
        tcp.set_checksum(csm);
    }

    Ok(buffer)
}

/// Decodes `frame` as an IPv4 SYN-ACK. Anything else yields `None`.
pub fn parse_syn_ack(frame: &[u8]) -> Option<SynAck> {
    let eth = ethernet::get_packet_from_u8(frame).ok()?;
    if eth.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }

    let ip = Ipv4Packet::new(eth.payload())?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
        return None;
    }

    let tcp = TcpPacket::new(ip.payload())?;
    let flags = tcp.get_flags();
    if flags & TcpFlags::SYN == 0 || flags & TcpFlags::ACK == 0 {
        return None;
    }

    Some(SynAck {
        source: AddressPort::new(ip.get_source(), tcp.get_source()),
        destination: ip.get_destination(),
    })
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
