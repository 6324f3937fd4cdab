use std::time::Instant;

use sockscan_common::{info, warn};
use sockscan_core::{Orchestrator, ScannerRegistry};
use tokio_util::sync::CancellationToken;

use crate::commands::CommandLine;
use crate::terminal::print;

pub async fn scan(cmd: &CommandLine) -> anyhow::Result<()> {
    let cfg = cmd.to_config()?;
    let registry = ScannerRegistry::with_defaults();
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    info!(
        "scanning {} addresses x {} ports with the {} backend",
        cfg.targets.address_count(),
        cfg.targets.ports.len(),
        cfg.backend
    );
    let output = cmd.output.clone();
    let start_time = Instant::now();
    let report = Orchestrator::new(cfg, &registry, cancel).run().await?;

    print::report(&report, start_time.elapsed());
    if let Some(path) = output {
        print::write_report(&path, &report)?;
        info!("results written to {}", path.display());
    }
    Ok(())
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, wrapping up");
            cancel.cancel();
        }
    });
}
