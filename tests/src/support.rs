//! Loopback stand-ins for the services a scan talks to.

use std::net::{Ipv4Addr, SocketAddr};

use anyhow::{bail, Context};
use sockscan_common::network::AddressPort;
use sockscan_protocols::socks5::{
    self, TargetAddr, ADDR_TYPE_DOMAIN, AUTH_METHOD_NONE, AUTH_METHOD_NOT_ACCEPTABLE, CMD_TCP_CONNECT,
    CMD_UDP_ASSOCIATE, REPLY_HEAD_LEN, SOCKS5_VERSION,
};
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpListener, TcpStream, UdpSocket};

const COMMAND_NOT_SUPPORTED: u8 = 0x07;

pub async fn loopback_listener() -> (TcpListener, AddressPort) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = v4(listener.local_addr().unwrap());
    (listener, addr)
}

/// A loopback port with nothing listening on it.
pub async fn closed_port() -> AddressPort {
    let (listener, addr) = loopback_listener().await;
    drop(listener);
    addr
}

pub fn v4(addr: SocketAddr) -> AddressPort {
    match addr {
        SocketAddr::V4(addr) => addr,
        SocketAddr::V6(addr) => panic!("expected an IPv4 address, got {addr}"),
    }
}

/// Accepts and immediately drops every connection.
pub async fn spawn_tcp_sink() -> AddressPort {
    let (listener, addr) = loopback_listener().await;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });
    addr
}

/// Answers every request with an empty `status` response. Returns the URL to fetch.
pub async fn spawn_http_status(status: u16) -> String {
    let (listener, addr) = loopback_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 512];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!("HTTP/1.1 {status} Mock\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });
    format!("http://{addr}/status/{status}")
}

/// A resolver that answers every query with one A record.
pub async fn spawn_fake_dns() -> SocketAddr {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        while let Ok((n, from)) = socket.recv_from(&mut buf).await {
            let _ = socket.send_to(&answer_a(&buf[..n]), from).await;
        }
    });
    addr
}

fn answer_a(query: &[u8]) -> Vec<u8> {
    let mut resp = query.to_vec();
    resp[2] |= 0x80;
    resp[6..8].copy_from_slice(&1u16.to_be_bytes());
    resp.extend_from_slice(&[0xc0, 0x0c]);
    resp.extend_from_slice(&1u16.to_be_bytes());
    resp.extend_from_slice(&1u16.to_be_bytes());
    resp.extend_from_slice(&60u32.to_be_bytes());
    resp.extend_from_slice(&4u16.to_be_bytes());
    resp.extend_from_slice(&[93, 184, 216, 34]);
    resp
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMode {
    /// Refuses every authentication method.
    RejectAuth,
    /// CONNECT only; UDP ASSOCIATE is answered with "command not supported".
    ConnectOnly,
    /// CONNECT and a working UDP relay.
    Full,
}

/// A minimal SOCKS5 server on loopback.
pub async fn spawn_socks5(mode: MockMode) -> AddressPort {
    let (listener, addr) = loopback_listener().await;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = serve(stream, mode).await;
            });
        }
    });
    addr
}

async fn serve(mut stream: TcpStream, mode: MockMode) -> anyhow::Result<()> {
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await?;
    let mut methods = vec![0u8; head[1] as usize];
    stream.read_exact(&mut methods).await?;

    if mode == MockMode::RejectAuth || !methods.contains(&AUTH_METHOD_NONE) {
        stream.write_all(&[SOCKS5_VERSION, AUTH_METHOD_NOT_ACCEPTABLE]).await?;
        return Ok(());
    }
    stream.write_all(&[SOCKS5_VERSION, AUTH_METHOD_NONE]).await?;

    let mut request = [0u8; REPLY_HEAD_LEN];
    stream.read_exact(&mut request).await?;
    let target = read_target(&mut stream, request[3]).await?;

    match request[1] {
        CMD_TCP_CONNECT => serve_connect(stream, target).await,
        CMD_UDP_ASSOCIATE if mode == MockMode::Full => serve_associate(stream).await,
        _ => {
            reply(&mut stream, COMMAND_NOT_SUPPORTED, &TargetAddr::unspecified()).await?;
            Ok(())
        }
    }
}

async fn read_target(stream: &mut TcpStream, atyp: u8) -> anyhow::Result<TargetAddr> {
    let mut raw = vec![atyp];
    if atyp == ADDR_TYPE_DOMAIN {
        raw.push(stream.read_u8().await?);
    }
    let needed = socks5::addr_len(atyp, raw.get(1).copied())?;
    let start = raw.len();
    raw.resize(needed, 0);
    stream.read_exact(&mut raw[start..]).await?;
    Ok(TargetAddr::decode(&raw)?.0)
}

async fn resolve(target: &TargetAddr) -> anyhow::Result<SocketAddr> {
    match target {
        TargetAddr::Ip(addr) => Ok(*addr),
        TargetAddr::Domain(host, port) => lookup_host((host.as_str(), *port))
            .await?
            .next()
            .context("unresolvable target"),
    }
}

async fn reply(stream: &mut TcpStream, code: u8, bound: &TargetAddr) -> io::Result<()> {
    let mut buf = vec![SOCKS5_VERSION, code, 0];
    bound.encode(&mut buf);
    stream.write_all(&buf).await
}

async fn serve_connect(mut stream: TcpStream, target: TargetAddr) -> anyhow::Result<()> {
    let mut upstream = TcpStream::connect(resolve(&target).await?).await?;
    reply(&mut stream, socks5::REPLY_SUCCEEDED, &TargetAddr::unspecified()).await?;
    io::copy_bidirectional(&mut stream, &mut upstream).await?;
    Ok(())
}

/// Relays datagrams until the control connection closes.
///
/// The bound address is reported as 0.0.0.0 so the client has to fall back
/// to the address it reached the proxy on.
async fn serve_associate(mut stream: TcpStream) -> anyhow::Result<()> {
    let relay = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let bound = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), relay.local_addr()?.port());
    reply(&mut stream, socks5::REPLY_SUCCEEDED, &TargetAddr::Ip(bound)).await?;

    let relaying = tokio::spawn(async move { relay_datagrams(relay).await });
    let mut sink = [0u8; 64];
    while stream.read(&mut sink).await? > 0 {}
    relaying.abort();
    Ok(())
}

async fn relay_datagrams(relay: UdpSocket) -> anyhow::Result<()> {
    let upstream = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let mut buf = [0u8; 2048];
    loop {
        let (n, client) = relay.recv_from(&mut buf).await?;
        let (target, payload) = socks5::decode_udp_datagram(&buf[..n])?;
        let target = resolve(&target).await?;
        upstream.send_to(payload, target).await?;

        let mut answer = [0u8; 2048];
        let (m, origin) = upstream.recv_from(&mut answer).await?;
        if origin != target {
            bail!("unexpected datagram from {origin}");
        }
        let wrapped = socks5::encode_udp_datagram(&TargetAddr::Ip(origin), &answer[..m]);
        relay.send_to(&wrapped, client).await?;
    }
}
