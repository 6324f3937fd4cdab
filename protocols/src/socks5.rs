//! SOCKS5 client-side messages (RFC 1928), no authentication.
//!
//! Only the pieces needed to open a UDP ASSOCIATE session and to wrap
//! datagrams for the relay are implemented here. The HTTP check goes through
//! a full client library.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use thiserror::Error;

pub const SOCKS5_VERSION: u8 = 0x05;

pub const AUTH_METHOD_NONE: u8 = 0x00;
pub const AUTH_METHOD_NOT_ACCEPTABLE: u8 = 0xFF;

pub const CMD_TCP_CONNECT: u8 = 0x01;
pub const CMD_UDP_ASSOCIATE: u8 = 0x03;

pub const ADDR_TYPE_IPV4: u8 = 0x01;
pub const ADDR_TYPE_DOMAIN: u8 = 0x03;
pub const ADDR_TYPE_IPV6: u8 = 0x04;

pub const REPLY_SUCCEEDED: u8 = 0x00;
pub const RESERVED: u8 = 0x00;

/// Length of `VER REP RSV ATYP`, the fixed head of a reply.
pub const REPLY_HEAD_LEN: usize = 4;
/// Length of `RSV RSV FRAG`, the fixed head of a UDP datagram.
const UDP_HEAD_LEN: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Socks5Error {
    #[error("unexpected SOCKS version {0:#04x}")]
    VersionMismatch(u8),
    #[error("server accepts none of the offered authentication methods")]
    NoAcceptableMethod,
    #[error("server selected unsupported authentication method {0:#04x}")]
    UnsupportedMethod(u8),
    #[error("request rejected with reply code {0:#04x} ({desc})", desc = reply_description(*.0))]
    RequestFailed(u8),
    #[error("unsupported address type {0:#04x}")]
    UnsupportedAddressType(u8),
    #[error("message truncated")]
    Truncated,
    #[error("fragmented UDP datagrams are not supported")]
    Fragmented,
}

fn reply_description(code: u8) -> &'static str {
    match code {
        0x00 => "succeeded",
        0x01 => "general SOCKS server failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unassigned reply code",
    }
}

/// Destination of a request or a relayed datagram.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetAddr {
    Ip(SocketAddr),
    Domain(String, u16),
}

impl TargetAddr {
    pub fn unspecified() -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0))
    }

    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            TargetAddr::Ip(SocketAddr::V4(addr)) => {
                buf.push(ADDR_TYPE_IPV4);
                buf.extend_from_slice(&addr.ip().octets());
            }
            TargetAddr::Ip(SocketAddr::V6(addr)) => {
                buf.push(ADDR_TYPE_IPV6);
                buf.extend_from_slice(&addr.ip().octets());
            }
            TargetAddr::Domain(domain, _) => {
                let bytes = domain.as_bytes();
                let len = bytes.len().min(u8::MAX as usize);
                buf.push(ADDR_TYPE_DOMAIN);
                buf.push(len as u8);
                buf.extend_from_slice(&bytes[..len]);
            }
        }
        buf.extend_from_slice(&self.port().to_be_bytes());
    }

    /// Decodes `ATYP ADDR PORT` from the front of `buf`, returning the bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), Socks5Error> {
        let atyp = *buf.first().ok_or(Socks5Error::Truncated)?;
        let needed = addr_len(atyp, buf.get(1).copied())?;
        if buf.len() < needed {
            return Err(Socks5Error::Truncated);
        }

        let port = u16::from_be_bytes([buf[needed - 2], buf[needed - 1]]);
        let addr = match atyp {
            ADDR_TYPE_IPV4 => {
                let ip = Ipv4Addr::new(buf[1], buf[2], buf[3], buf[4]);
                TargetAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port))
            }
            ADDR_TYPE_IPV6 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[1..17]);
                TargetAddr::Ip(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
            }
            _ => {
                let len = buf[1] as usize;
                let domain = String::from_utf8_lossy(&buf[2..2 + len]).into_owned();
                TargetAddr::Domain(domain, port)
            }
        };
        Ok((addr, needed))
    }
}

/// Total length of `ATYP ADDR PORT` for `atyp`.
///
/// Domain names need their length byte, passed as `first_addr_byte`.
pub fn addr_len(atyp: u8, first_addr_byte: Option<u8>) -> Result<usize, Socks5Error> {
    match atyp {
        ADDR_TYPE_IPV4 => Ok(1 + 4 + 2),
        ADDR_TYPE_IPV6 => Ok(1 + 16 + 2),
        ADDR_TYPE_DOMAIN => {
            let len = first_addr_byte.ok_or(Socks5Error::Truncated)?;
            Ok(1 + 1 + len as usize + 2)
        }
        other => Err(Socks5Error::UnsupportedAddressType(other)),
    }
}

/// Offers "no authentication" as the only method.
pub fn greeting() -> [u8; 3] {
    [SOCKS5_VERSION, 1, AUTH_METHOD_NONE]
}

pub fn parse_method_selection(reply: [u8; 2]) -> Result<(), Socks5Error> {
    let [version, method] = reply;
    if version != SOCKS5_VERSION {
        return Err(Socks5Error::VersionMismatch(version));
    }
    match method {
        AUTH_METHOD_NONE => Ok(()),
        AUTH_METHOD_NOT_ACCEPTABLE => Err(Socks5Error::NoAcceptableMethod),
        other => Err(Socks5Error::UnsupportedMethod(other)),
    }
}

pub fn encode_request(cmd: u8, target: &TargetAddr) -> Vec<u8> {
    let mut buf = vec![SOCKS5_VERSION, cmd, RESERVED];
    target.encode(&mut buf);
    buf
}

/// Validates `VER REP RSV ATYP` and returns the address type that follows.
pub fn parse_reply_head(head: [u8; REPLY_HEAD_LEN]) -> Result<u8, Socks5Error> {
    let [version, reply, _, atyp] = head;
    if version != SOCKS5_VERSION {
        return Err(Socks5Error::VersionMismatch(version));
    }
    if reply != REPLY_SUCCEEDED {
        return Err(Socks5Error::RequestFailed(reply));
    }
    Ok(atyp)
}

/// Wraps `payload` for the UDP relay: `RSV RSV FRAG ATYP ADDR PORT DATA`.
pub fn encode_udp_datagram(target: &TargetAddr, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(UDP_HEAD_LEN + 19 + payload.len());
    buf.extend_from_slice(&[RESERVED, RESERVED, 0]);
    target.encode(&mut buf);
    buf.extend_from_slice(payload);
    buf
}

/// Splits a relayed datagram into its origin and payload.
pub fn decode_udp_datagram(buf: &[u8]) -> Result<(TargetAddr, &[u8]), Socks5Error> {
    if buf.len() < UDP_HEAD_LEN {
        return Err(Socks5Error::Truncated);
    }
    if buf[2] != 0 {
        return Err(Socks5Error::Fragmented);
    }
    let (origin, consumed) = TargetAddr::decode(&buf[UDP_HEAD_LEN..])?;
    Ok((origin, &buf[UDP_HEAD_LEN + consumed..]))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
