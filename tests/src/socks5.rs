use std::time::Duration;

use sockscan_core::{ProbeResult, Socks5Prober};

use crate::support::{self, MockMode};

const TIMEOUT: Duration = Duration::from_secs(3);

/// An endpoint that speaks SOCKS5 but accepts no method is not a proxy.
#[tokio::test]
async fn auth_rejecting_server_is_not_a_proxy() {
    let url = support::spawn_http_status(204).await;
    let proxy = support::spawn_socks5(MockMode::RejectAuth).await;

    let result = Socks5Prober::new(url, TIMEOUT).probe(proxy).await;
    assert_eq!(result, ProbeResult::failed(proxy));
}

#[tokio::test]
async fn open_proxy_with_udp_relay_is_fully_capable() {
    let url = support::spawn_http_status(204).await;
    let dns = support::spawn_fake_dns().await;
    let proxy = support::spawn_socks5(MockMode::Full).await;

    let result = Socks5Prober::new(url, TIMEOUT)
        .with_dns_server(dns)
        .probe(proxy)
        .await;

    assert!(result.success);
    assert!(result.udp_capable);
}

#[tokio::test]
async fn open_proxy_without_udp_support_is_tcp_only() {
    let url = support::spawn_http_status(204).await;
    let dns = support::spawn_fake_dns().await;
    let proxy = support::spawn_socks5(MockMode::ConnectOnly).await;

    let result = Socks5Prober::new(url, TIMEOUT)
        .with_dns_server(dns)
        .probe(proxy)
        .await;

    assert!(result.success);
    assert!(!result.udp_capable);
}

/// A relay that forwards into the void leaves the UDP check to its timeout.
#[tokio::test]
async fn silent_resolver_times_out_udp_check() {
    let url = support::spawn_http_status(204).await;
    let proxy = support::spawn_socks5(MockMode::Full).await;
    let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let result = Socks5Prober::new(url, Duration::from_millis(500))
        .with_dns_server(silent.local_addr().unwrap())
        .probe(proxy)
        .await;

    assert!(result.success);
    assert!(!result.udp_capable);
}

/// The proxy relays fine but the test URL answers 404.
#[tokio::test]
async fn non_success_status_through_proxy_is_not_a_proxy() {
    let url = support::spawn_http_status(404).await;
    let dns = support::spawn_fake_dns().await;
    let proxy = support::spawn_socks5(MockMode::Full).await;

    let result = Socks5Prober::new(url, TIMEOUT)
        .with_dns_server(dns)
        .probe(proxy)
        .await;

    assert_eq!(result, ProbeResult::failed(proxy));
}

/// The proxy cannot reach the test URL at all.
#[tokio::test]
async fn unreachable_test_url_fails_http_check() {
    let closed = support::closed_port().await;
    let proxy = support::spawn_socks5(MockMode::Full).await;

    let result = Socks5Prober::new(format!("http://{closed}/"), TIMEOUT).probe(proxy).await;
    assert!(!result.success);
    assert!(!result.udp_capable);
}
