//! Stateless SYN scanning over a raw datalink channel.
//!
//! Probes are complete Ethernet frames addressed to the default gateway, so
//! the kernel's TCP stack never sees them. Replies are read back from the
//! same interface; a SYN-ACK counts only while its probe is still pending,
//! which drops duplicates, late answers and unsolicited traffic alike.
//!
//! This scanner requires **root privileges** to open the capture device.

use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pnet::datalink::{self, Channel, Config, NetworkInterface};
use pnet::util::MacAddr;
use sockscan_common::config::ScanConfig;
use sockscan_common::error::ScanError;
use sockscan_common::network::AddressPort;
use sockscan_common::network::interface::{self, EgressRoute};
use sockscan_common::{debug, error, info, warn};
use sockscan_protocols::arp;
use sockscan_protocols::tcp::{self, LinkHeader, SynProbe};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::{ALIVE_BUFFER, AliveStream, Discovery};
use crate::limiter::RateLimiter;
use crate::network::channel::{self, EthernetHandle};
use crate::pending::PendingTracker;

const ARP_TIMEOUT: Duration = Duration::from_secs(3);
const ARP_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy)]
struct ArpSettings {
    timeout: Duration,
    attempts: u32,
}

impl Default for ArpSettings {
    fn default() -> Self {
        Self {
            timeout: ARP_TIMEOUT,
            attempts: ARP_ATTEMPTS,
        }
    }
}

pub struct RawScanner {
    link: LinkHeader,
    tx: Box<dyn datalink::DataLinkSender>,
    limiter: RateLimiter,
    pending: Arc<PendingTracker<AddressPort>>,
    alive_rx: Option<AliveStream>,
    capture: Option<JoinHandle<()>>,
    stop_capture: CancellationToken,
    cancel: CancellationToken,
    ended: bool,
}

impl RawScanner {
    pub async fn new(cfg: &ScanConfig, cancel: CancellationToken) -> anyhow::Result<Self> {
        if !is_root::is_root() {
            return Err(ScanError::platform("raw scanning requires root privileges").into());
        }
        let route = interface::resolve_egress_route()?;
        info!(
            "raw scan on {} from {} via gateway {}",
            route.interface.name, route.source_ip, route.gateway
        );
        Self::with_channel(route, cfg, cancel, datalink::channel, ArpSettings::default()).await
    }

    async fn with_channel<F>(
        route: EgressRoute,
        cfg: &ScanConfig,
        cancel: CancellationToken,
        channel_opener: F,
        arp_settings: ArpSettings,
    ) -> anyhow::Result<Self>
    where
        F: FnOnce(&NetworkInterface, Config) -> io::Result<Channel>,
    {
        let mut handle = channel::start_capture(&route.interface, channel_opener)
            .map_err(|e| ScanError::platform(format!("{e:#}")))?;
        let gateway_mac = resolve_gateway_mac(&mut handle, &route, arp_settings).await?;
        debug!("gateway {} is at {gateway_mac}", route.gateway);

        let link = LinkHeader {
            src_mac: route.source_mac,
            dst_mac: gateway_mac,
            src_ip: route.source_ip,
        };
        let pending = Arc::new(PendingTracker::new(cfg.pending_ttl));
        let (alive_tx, alive_rx) = mpsc::channel(ALIVE_BUFFER);
        let stop_capture = CancellationToken::new();

        let EthernetHandle { tx, rx } = handle;
        let capture = tokio::spawn(capture_loop(
            rx,
            route.source_ip,
            pending.clone(),
            alive_tx,
            stop_capture.clone(),
        ));

        Ok(Self {
            link,
            tx,
            limiter: RateLimiter::new(cfg.rate),
            pending,
            alive_rx: Some(alive_rx),
            capture: Some(capture),
            stop_capture,
            cancel,
            ended: false,
        })
    }
}

#[async_trait]
impl Discovery for RawScanner {
    async fn send(&mut self, target: AddressPort) {
        if self.ended {
            warn!("calling send after end is not allowed");
            return;
        }
        let frame = match tcp::create_syn_frame(&self.link, &SynProbe::random(target)) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("building probe for {target} failed: {e:#}");
                return;
            }
        };
        if !self.limiter.acquire(&self.cancel).await {
            return;
        }

        // Registered before writing so a fast reply cannot beat the bookkeeping.
        self.pending.add(target);
        match self.tx.send_to(&frame, None) {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                debug!("write probe to {target} failed: {e}");
                self.pending.take(&target);
            }
            None => {
                self.pending.take(&target);
            }
        }
    }

    fn alive(&mut self) -> Option<AliveStream> {
        self.alive_rx.take()
    }

    async fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;

        tokio::select! {
            _ = self.pending.wait() => {}
            _ = self.cancel.cancelled() => {}
        }
        self.stop_capture.cancel();
        if let Some(capture) = self.capture.take() {
            if let Err(e) = capture.await {
                error!("capture task failed: {e}");
            }
        }
    }
}

impl Drop for RawScanner {
    fn drop(&mut self) {
        self.stop_capture.cancel();
    }
}

async fn resolve_gateway_mac(
    handle: &mut EthernetHandle,
    route: &EgressRoute,
    settings: ArpSettings,
) -> Result<MacAddr, ScanError> {
    let request = arp::create_request(route.source_mac, route.source_ip, route.gateway)
        .map_err(|e| ScanError::platform(format!("building ARP request: {e:#}")))?;

    for attempt in 1..=settings.attempts {
        if let Some(Err(e)) = handle.tx.send_to(&request, None) {
            debug!("sending ARP request failed: {e}");
        }
        let deadline = Instant::now() + settings.timeout;
        match time::timeout_at(deadline, await_arp_reply(&mut handle.rx, route.gateway)).await {
            Ok(Some(mac)) => return Ok(mac),
            Ok(None) => break,
            Err(_) => debug!(
                "no ARP reply from {} (attempt {attempt}/{})",
                route.gateway, settings.attempts
            ),
        }
    }

    Err(ScanError::platform(format!(
        "could not resolve hardware address of gateway {}",
        route.gateway
    )))
}

async fn await_arp_reply(frames: &mut mpsc::Receiver<Vec<u8>>, gateway: Ipv4Addr) -> Option<MacAddr> {
    while let Some(frame) = frames.recv().await {
        if let Ok(mac) = arp::get_reply_mac(&frame, gateway) {
            return Some(mac);
        }
    }
    None
}

async fn capture_loop(
    mut frames: mpsc::Receiver<Vec<u8>>,
    local_ip: Ipv4Addr,
    pending: Arc<PendingTracker<AddressPort>>,
    alive_tx: mpsc::Sender<AddressPort>,
    stop: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            frame = frames.recv() => frame,
        };
        let Some(frame) = frame else { break };
        let Some(addr) = accept_reply(&frame, local_ip, &pending) else {
            continue;
        };
        debug!("{addr} alive");
        if alive_tx.send(addr).await.is_err() {
            break;
        }
    }
}

/// The responder behind `frame`, if it answers a probe that is still pending.
fn accept_reply(frame: &[u8], local_ip: Ipv4Addr, pending: &PendingTracker<AddressPort>) -> Option<AddressPort> {
    let reply = tcp::parse_syn_ack(frame)?;
    // Our own outbound traffic shows up on the capture too.
    if *reply.source.ip() == local_ip {
        return None;
    }
    pending.take(&reply.source).then_some(reply.source)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::datalink::dummy;
    use pnet::packet::Packet;
    use pnet::packet::arp::{ArpOperations, MutableArpPacket};
    use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
    use pnet::packet::ipv4::{Ipv4Packet, MutableIpv4Packet};
    use pnet::packet::tcp::{MutableTcpPacket, TcpFlags, TcpPacket};
    use sockscan_common::config::Rate;
    use sockscan_protocols::{ETH_HDR_LEN, IPV4_HDR_LEN};
    use std::sync::mpsc::Receiver;

    const LOCAL_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0, 0x01);
    const GATEWAY_MAC: MacAddr = MacAddr(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff);
    const LOCAL_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
    const GATEWAY_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
    const FAST_ARP: ArpSettings = ArpSettings {
        timeout: Duration::from_millis(50),
        attempts: 2,
    };
    const WRITE_WAIT: Duration = Duration::from_secs(1);

    fn route() -> EgressRoute {
        EgressRoute {
            interface: dummy::dummy_interface(0),
            source_ip: LOCAL_IP,
            source_mac: LOCAL_MAC,
            gateway: GATEWAY_IP,
        }
    }

    fn target() -> AddressPort {
        AddressPort::new(Ipv4Addr::new(203, 0, 113, 9), 7890)
    }

    fn cfg(pending_ttl: Duration) -> ScanConfig {
        ScanConfig {
            rate: Rate::Unlimited,
            pending_ttl,
            ..Default::default()
        }
    }

    fn gateway_arp_reply() -> Box<[u8]> {
        let mut frame = arp::create_request(GATEWAY_MAC, GATEWAY_IP, LOCAL_IP).unwrap();
        MutableEthernetPacket::new(&mut frame).unwrap().set_destination(LOCAL_MAC);
        MutableArpPacket::new(&mut frame[ETH_HDR_LEN..])
            .unwrap()
            .set_operation(ArpOperations::Reply);
        frame.into_boxed_slice()
    }

    /// The SYN-ACK a listening host would send back for `syn`.
    fn syn_ack_for(syn: &[u8]) -> Box<[u8]> {
        let eth = EthernetPacket::new(syn).unwrap();
        let ip = Ipv4Packet::new(eth.payload()).unwrap();
        let tcp = TcpPacket::new(ip.payload()).unwrap();

        let mut reply = syn.to_vec();
        {
            let mut reth = MutableEthernetPacket::new(&mut reply).unwrap();
            reth.set_source(eth.get_destination());
            reth.set_destination(eth.get_source());
        }
        {
            let mut rip = MutableIpv4Packet::new(&mut reply[ETH_HDR_LEN..]).unwrap();
            rip.set_source(ip.get_destination());
            rip.set_destination(ip.get_source());
        }
        {
            let mut rtcp = MutableTcpPacket::new(&mut reply[ETH_HDR_LEN + IPV4_HDR_LEN..]).unwrap();
            rtcp.set_source(tcp.get_destination());
            rtcp.set_destination(tcp.get_source());
            rtcp.set_flags(TcpFlags::SYN | TcpFlags::ACK);
        }
        reply.into_boxed_slice()
    }

    fn next_written(written: &Receiver<Box<[u8]>>) -> Box<[u8]> {
        written.recv_timeout(WRITE_WAIT).unwrap()
    }

    #[test]
    fn accept_reply_should_require_pending_probe() {
        let pending = PendingTracker::new(Duration::from_secs(5));
        let link = LinkHeader {
            src_mac: LOCAL_MAC,
            dst_mac: GATEWAY_MAC,
            src_ip: LOCAL_IP,
        };
        let syn = tcp::create_syn_frame(&link, &SynProbe::random(target())).unwrap();
        let reply = syn_ack_for(&syn);

        assert_eq!(accept_reply(&reply, LOCAL_IP, &pending), None);
        pending.add(target());
        assert_eq!(accept_reply(&reply, LOCAL_IP, &pending), Some(target()));
        assert_eq!(accept_reply(&reply, LOCAL_IP, &pending), None);
    }

    #[test]
    fn accept_reply_should_skip_own_traffic() {
        let pending = PendingTracker::new(Duration::from_secs(5));
        let own = AddressPort::new(LOCAL_IP, 7890);
        let link = LinkHeader {
            src_mac: GATEWAY_MAC,
            dst_mac: LOCAL_MAC,
            src_ip: GATEWAY_IP,
        };
        let syn = tcp::create_syn_frame(&link, &SynProbe::random(own)).unwrap();
        pending.add(own);

        assert_eq!(accept_reply(&syn_ack_for(&syn), LOCAL_IP, &pending), None);
        assert!(pending.exist(&own));
    }

    #[tokio::test]
    async fn duplicate_syn_acks_should_yield_one_discovery() {
        let mut dummy_cfg = dummy::Config::default();
        let inject = dummy_cfg.inject_handle().unwrap();
        let written = dummy_cfg.read_handle().unwrap();
        inject.send(Ok(gateway_arp_reply())).unwrap();

        let mut scanner = RawScanner::with_channel(
            route(),
            &cfg(Duration::from_millis(300)),
            CancellationToken::new(),
            move |i, _cfg| dummy::channel(i, dummy_cfg),
            FAST_ARP,
        )
        .await
        .unwrap();
        assert_eq!(scanner.link.dst_mac, GATEWAY_MAC);
        let arp_request = next_written(&written);
        assert_eq!(EthernetPacket::new(&arp_request).unwrap().get_ethertype(), EtherTypes::Arp);

        let mut alive = scanner.alive().unwrap();
        scanner.send(target()).await;
        let reply = syn_ack_for(&next_written(&written));
        inject.send(Ok(reply.clone())).unwrap();
        inject.send(Ok(reply)).unwrap();
        scanner.end().await;

        assert_eq!(alive.recv().await, Some(target()));
        assert_eq!(alive.recv().await, None);
    }

    #[tokio::test]
    async fn send_after_end_should_write_nothing() {
        let mut dummy_cfg = dummy::Config::default();
        let inject = dummy_cfg.inject_handle().unwrap();
        let written = dummy_cfg.read_handle().unwrap();
        inject.send(Ok(gateway_arp_reply())).unwrap();

        let mut scanner = RawScanner::with_channel(
            route(),
            &cfg(Duration::from_millis(50)),
            CancellationToken::new(),
            move |i, _cfg| dummy::channel(i, dummy_cfg),
            FAST_ARP,
        )
        .await
        .unwrap();
        let _arp_request = next_written(&written);

        scanner.end().await;
        scanner.send(target()).await;
        assert!(written.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[tokio::test]
    async fn silent_gateway_should_fail_setup() {
        let mut dummy_cfg = dummy::Config::default();
        let _inject = dummy_cfg.inject_handle().unwrap();

        let result = RawScanner::with_channel(
            route(),
            &cfg(Duration::from_millis(50)),
            CancellationToken::new(),
            move |i, _cfg| dummy::channel(i, dummy_cfg),
            FAST_ARP,
        )
        .await;

        let err = result.err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ScanError>(),
            Some(ScanError::PlatformSetup(_))
        ));
    }

    #[tokio::test]
    async fn unopenable_device_should_fail_setup() {
        let result = RawScanner::with_channel(
            route(),
            &cfg(Duration::from_millis(50)),
            CancellationToken::new(),
            |_i, _cfg| Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
            FAST_ARP,
        )
        .await;

        let err = result.err().unwrap();
        assert!(err.to_string().contains("platform setup failed"));
    }

    #[tokio::test]
    #[ignore]
    async fn should_scan_through_real_gateway() {
        let mut scanner = RawScanner::new(&cfg(Duration::from_secs(2)), CancellationToken::new())
            .await
            .unwrap();
        let mut alive = scanner.alive().unwrap();
        scanner.send(AddressPort::new(Ipv4Addr::new(1, 1, 1, 1), 443)).await;
        scanner.end().await;
        assert!(alive.recv().await.is_some());
    }
}
