//! Verifies that an endpoint is an open SOCKS5 proxy and whether it relays UDP.
//!
//! Two independent checks run against every candidate:
//!
//! 1. **HTTP**: fetch the test URL through the candidate as a `socks5h://`
//!    proxy. Any 2xx answer marks the endpoint as a working proxy.
//! 2. **UDP**: only for working proxies. Open a UDP ASSOCIATE session and push
//!    a DNS A query through the relay to a public resolver. A datagram coming
//!    back with at least one answer marks the endpoint as UDP capable.
//!
//! Failures never escape: they are logged at debug level and folded into
//! the [`ProbeResult`] flags.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, ensure};
use reqwest::{Client, Proxy};
use sockscan_common::debug;
use sockscan_common::network::AddressPort;
use sockscan_protocols::dns::{self, MAX_DNS_RESPONSE_LEN};
use sockscan_protocols::socks5::{self, ADDR_TYPE_DOMAIN, CMD_UDP_ASSOCIATE, REPLY_HEAD_LEN, TargetAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tokio::time::timeout;

pub const DEFAULT_DNS_SERVER: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)), 53);
pub const DEFAULT_DNS_NAME: &str = "example.com";

/// Room for the relay header in front of the DNS payload.
const RELAY_HEADER_ROOM: usize = 262;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeResult {
    pub addr: AddressPort,
    /// The HTTP check through the proxy returned 2xx.
    pub success: bool,
    /// A DNS answer made it back through the UDP relay. Never set without `success`.
    pub udp_capable: bool,
}

impl ProbeResult {
    pub fn failed(addr: AddressPort) -> Self {
        Self {
            addr,
            success: false,
            udp_capable: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Socks5Prober {
    test_url: String,
    timeout: Duration,
    dns_server: SocketAddr,
}

impl Socks5Prober {
    pub fn new(test_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            test_url: test_url.into(),
            timeout,
            dns_server: DEFAULT_DNS_SERVER,
        }
    }

    /// Resolver the UDP check queries through the relay.
    pub fn with_dns_server(mut self, dns_server: SocketAddr) -> Self {
        self.dns_server = dns_server;
        self
    }

    pub async fn probe(&self, addr: AddressPort) -> ProbeResult {
        let mut result = ProbeResult::failed(addr);

        if let Err(e) = self.check_http(addr).await {
            debug!("{addr} http check failed: {e:#}");
            return result;
        }
        result.success = true;

        match timeout(self.timeout, self.check_udp(addr)).await {
            Ok(Ok(answers)) => {
                debug!("{addr} relayed {answers} DNS answers over UDP");
                result.udp_capable = true;
            }
            Ok(Err(e)) => debug!("{addr} udp check failed: {e:#}"),
            Err(_) => debug!("{addr} udp check timed out"),
        }
        result
    }

    async fn check_http(&self, addr: AddressPort) -> anyhow::Result<()> {
        let proxy = Proxy::all(format!("socks5h://{addr}")).context("building proxy")?;
        let client = Client::builder()
            .proxy(proxy)
            .timeout(self.timeout)
            .build()
            .context("building http client")?;

        let response = client.get(&self.test_url).send().await.context("request through proxy")?;
        let status = response.status();
        ensure!(status.is_success(), "unexpected status {status}");
        Ok(())
    }

    async fn check_udp(&self, addr: AddressPort) -> anyhow::Result<usize> {
        // The association lives as long as this control connection.
        let mut control = TcpStream::connect(addr).await.context("connecting control channel")?;
        let relay = associate(&mut control).await?;
        let relay = relay_addr(relay, addr).await?;

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await.context("binding udp socket")?;
        socket.connect(relay).await.with_context(|| format!("connecting to relay {relay}"))?;

        let id: u16 = rand::random();
        let query = dns::create_a_query(DEFAULT_DNS_NAME, id)?;
        let datagram = socks5::encode_udp_datagram(&TargetAddr::Ip(self.dns_server), &query);
        let written = socket.send(&datagram).await.context("sending to relay")?;
        ensure!(
            written == datagram.len(),
            "write length error, expect: {}, actual: {written}",
            datagram.len()
        );

        let mut buf = [0u8; MAX_DNS_RESPONSE_LEN + RELAY_HEADER_ROOM];
        let read = socket.recv(&mut buf).await.context("reading from relay")?;
        let (_origin, payload) = socks5::decode_udp_datagram(&buf[..read])?;
        dns::check_answer(payload, id)
    }
}

/// Runs the no-auth handshake and a UDP ASSOCIATE, returning the relay's BND address.
async fn associate(control: &mut TcpStream) -> anyhow::Result<TargetAddr> {
    control.write_all(&socks5::greeting()).await?;
    let mut selection = [0u8; 2];
    control.read_exact(&mut selection).await.context("reading method selection")?;
    socks5::parse_method_selection(selection)?;

    let request = socks5::encode_request(CMD_UDP_ASSOCIATE, &TargetAddr::unspecified());
    control.write_all(&request).await?;

    let mut head = [0u8; REPLY_HEAD_LEN];
    control.read_exact(&mut head).await.context("reading associate reply")?;
    let atyp = socks5::parse_reply_head(head)?;

    let mut bound = vec![atyp];
    if atyp == ADDR_TYPE_DOMAIN {
        bound.push(control.read_u8().await?);
    }
    let needed = socks5::addr_len(atyp, bound.get(1).copied())?;
    let start = bound.len();
    bound.resize(needed, 0);
    control.read_exact(&mut bound[start..]).await.context("reading bound address")?;

    let (relay, _) = TargetAddr::decode(&bound)?;
    Ok(relay)
}

/// Relays commonly answer 0.0.0.0, meaning "the address you already reached me on".
async fn relay_addr(bound: TargetAddr, proxy: AddressPort) -> anyhow::Result<SocketAddr> {
    match bound {
        TargetAddr::Ip(addr) if addr.ip().is_unspecified() => {
            Ok(SocketAddr::new(IpAddr::V4(*proxy.ip()), addr.port()))
        }
        TargetAddr::Ip(addr) => Ok(addr),
        TargetAddr::Domain(host, port) => lookup_host((host.as_str(), port))
            .await?
            .next()
            .with_context(|| format!("relay host {host} did not resolve")),
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
