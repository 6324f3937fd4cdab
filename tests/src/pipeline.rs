use std::time::Duration;

use sockscan_common::config::ScanConfig;
use sockscan_common::network::range::Prefix;
use sockscan_common::network::target::Targets;
use sockscan_core::{Orchestrator, ScannerRegistry, Socks5Prober};
use tokio_util::sync::CancellationToken;

use crate::support::{self, MockMode};

fn loopback_config(ports: Vec<u16>, test_url: String) -> ScanConfig {
    ScanConfig {
        targets: Targets::new(vec!["127.0.0.1".parse::<Prefix>().unwrap()], ports),
        test_url,
        probe_timeout: Duration::from_secs(3),
        ..Default::default()
    }
}

/// Generation, discovery and verification over loopback: one real proxy,
/// one plain TCP service and one closed port.
#[tokio::test]
async fn full_scan_separates_proxies_from_plain_services() {
    let url = support::spawn_http_status(204).await;
    let dns = support::spawn_fake_dns().await;
    let proxy = support::spawn_socks5(MockMode::Full).await;
    let sink = support::spawn_tcp_sink().await;
    let closed = support::closed_port().await;

    let cfg = loopback_config(vec![proxy.port(), sink.port(), closed.port()], url.clone());
    let registry = ScannerRegistry::with_defaults();
    let report = Orchestrator::new(cfg, &registry, CancellationToken::new())
        .with_prober(Socks5Prober::new(url, Duration::from_secs(3)).with_dns_server(dns))
        .run()
        .await
        .unwrap();

    let mut alive = report.alive.clone();
    alive.sort();
    let mut expected = vec![proxy, sink];
    expected.sort();
    assert_eq!(alive, expected);

    let proxies: Vec<_> = report.proxies().collect();
    assert_eq!(proxies.len(), 1);
    assert_eq!(proxies[0].addr, proxy);
    assert!(proxies[0].udp_capable);
    assert_eq!(report.results.len(), 2);
    assert!(!report.interrupted);
}

/// A run cancelled before it starts still completes and reports nothing.
#[tokio::test]
async fn cancelled_scan_returns_partial_report() {
    let url = support::spawn_http_status(204).await;
    let proxy = support::spawn_socks5(MockMode::Full).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let registry = ScannerRegistry::with_defaults();
    let report = Orchestrator::new(loopback_config(vec![proxy.port()], url), &registry, cancel)
        .run()
        .await
        .unwrap();

    assert!(report.interrupted);
    assert!(report.alive.is_empty());
    assert!(report.results.is_empty());
}
