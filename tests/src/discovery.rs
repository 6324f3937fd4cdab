use sockscan_common::config::ScanConfig;
use sockscan_core::{Discovery, ScannerRegistry};
use tokio_util::sync::CancellationToken;

use crate::support;

/// The connect backend reports exactly the loopback ports that accept.
#[tokio::test]
async fn system_backend_finds_loopback_listener() {
    let open = support::spawn_tcp_sink().await;
    let closed = support::closed_port().await;

    let registry = ScannerRegistry::with_defaults();
    let mut scanner = registry
        .build("system", &ScanConfig::default(), CancellationToken::new())
        .await
        .unwrap();
    let mut alive = scanner.alive().unwrap();

    scanner.send(open).await;
    scanner.send(closed).await;
    scanner.end().await;

    let mut found = Vec::new();
    while let Some(addr) = alive.recv().await {
        found.push(addr);
    }
    assert_eq!(found, vec![open]);
}

/// The `connect` alias reaches the same backend.
#[tokio::test]
async fn connect_alias_builds_connect_backend() {
    let open = support::spawn_tcp_sink().await;
    let registry = ScannerRegistry::with_defaults();
    let mut scanner = registry
        .build("connect", &ScanConfig::default(), CancellationToken::new())
        .await
        .unwrap();
    let mut alive = scanner.alive().unwrap();

    scanner.send(open).await;
    scanner.end().await;

    assert_eq!(alive.recv().await, Some(open));
    assert_eq!(alive.recv().await, None);
}

/// Without root the raw backend refuses to start instead of scanning nothing.
#[cfg(any(target_os = "linux", target_os = "macos"))]
#[tokio::test]
#[ignore]
async fn pcap_backend_requires_privileges() {
    let registry = ScannerRegistry::with_defaults();
    let result = registry
        .build("pcap", &ScanConfig::default(), CancellationToken::new())
        .await;
    assert!(result.is_err());
}
