use std::time::Duration;

use sockscan_common::debug;
use sockscan_common::network::AddressPort;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Completes a full TCP handshake with `addr` and closes it right away.
///
/// Only an accepted connection counts; refusals, unreachable hosts and
/// timeouts all read as closed.
pub async fn handshake_probe(addr: AddressPort, dial_timeout: Duration) -> bool {
    match timeout(dial_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            debug!("dial {addr} failed: {e}");
            false
        }
        Err(_elapsed) => false,
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
