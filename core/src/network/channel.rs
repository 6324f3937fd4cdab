use std::io::ErrorKind;
use std::time::Duration;

use anyhow::{Context, bail};
use pnet::datalink::{self, Channel, Config, DataLinkReceiver, DataLinkSender, NetworkInterface};
use sockscan_common::debug;
use sockscan_protocols::tcp::MAX_SYN_ACK_FRAME_LEN;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Frames buffered between the reader thread and the correlation task.
pub const CAPTURE_BUFFER: usize = 8192;

const READ_TIMEOUT: Duration = Duration::from_millis(50);
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Write half of a datalink channel plus the frames read from it.
pub struct EthernetHandle {
    pub tx: Box<dyn DataLinkSender>,
    pub rx: mpsc::Receiver<Vec<u8>>,
}

pub fn config() -> Config {
    Config {
        read_timeout: Some(READ_TIMEOUT),
        ..Default::default()
    }
}

/// Opens `intf` through `channel_opener` and starts forwarding short frames.
///
/// The reader runs on its own OS thread because `DataLinkReceiver::next`
/// blocks. It stops once the handle's receiver is dropped. Frames arriving
/// while the buffer is full are dropped and counted.
pub fn start_capture<F>(intf: &NetworkInterface, channel_opener: F) -> anyhow::Result<EthernetHandle>
where
    F: FnOnce(&NetworkInterface, Config) -> std::io::Result<Channel>,
{
    let (tx, rx) = open_eth_channel(intf, &config(), channel_opener)?;
    let (queue_tx, queue_rx) = mpsc::channel(CAPTURE_BUFFER);

    std::thread::Builder::new()
        .name(format!("capture-{}", intf.name))
        .spawn(move || read_frames(rx, queue_tx))
        .context("spawning capture thread")?;

    Ok(EthernetHandle { tx, rx: queue_rx })
}

pub fn open_eth_channel<F>(
    intf: &NetworkInterface,
    cfg: &Config,
    channel_opener: F,
) -> anyhow::Result<(Box<dyn DataLinkSender>, Box<dyn DataLinkReceiver>)>
where
    F: FnOnce(&NetworkInterface, Config) -> std::io::Result<datalink::Channel>,
{
    let ch: Channel = channel_opener(intf, *cfg).with_context(|| format!("opening on {}", intf.name))?;
    match ch {
        Channel::Ethernet(tx, rx) => {
            debug!("datalink channel open on {}", intf.name);
            Ok((tx, rx))
        }
        _ => bail!("non-ethernet channel for {}", intf.name),
    }
}

fn read_frames(mut rx: Box<dyn DataLinkReceiver>, queue: mpsc::Sender<Vec<u8>>) {
    let mut dropped: u64 = 0;
    loop {
        match rx.next() {
            Ok(frame) if frame.len() <= MAX_SYN_ACK_FRAME_LEN => {
                if !forward(&queue, frame, &mut dropped) {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
            Err(e) => {
                debug!("capture read failed: {e}");
                std::thread::sleep(READ_ERROR_BACKOFF);
            }
        }
        if queue.is_closed() {
            break;
        }
    }
    if dropped > 0 {
        debug!("capture stopped, {dropped} frames dropped on a full queue");
    }
}

/// Hands `frame` to the queue without blocking. Returns `false` once the
/// consumer is gone.
fn forward(queue: &mpsc::Sender<Vec<u8>>, frame: &[u8], dropped: &mut u64) -> bool {
    match queue.try_send(frame.to_vec()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            *dropped += 1;
            if dropped.is_power_of_two() {
                debug!("capture queue full, {dropped} frames dropped so far");
            }
            true
        }
        Err(TrySendError::Closed(_)) => false,
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
