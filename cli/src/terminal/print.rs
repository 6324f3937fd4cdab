use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use colored::*;
use sockscan_common::{info, success, warn};
use sockscan_core::{ProbeResult, ScanReport};

pub const TOTAL_WIDTH: usize = 64;

pub fn header(msg: &str) {
    let formatted: String = format!("⟦ {} ⟧", msg);
    let msg_len: usize = formatted.chars().count();

    let dash_count: usize = TOTAL_WIDTH.saturating_sub(msg_len);
    let left: usize = dash_count / 2;
    let right: usize = dash_count - left;

    let line: ColoredString = format!(
        "{}{}{}",
        "─".repeat(left),
        formatted.to_uppercase(),
        "─".repeat(right)
    )
    .bright_green();
    info!("{line}");
}

/// Verified proxies ordered by address.
pub fn sorted_proxies(report: &ScanReport) -> Vec<ProbeResult> {
    let mut proxies: Vec<ProbeResult> = report.proxies().copied().collect();
    proxies.sort_by_key(|r| r.addr);
    proxies
}

pub fn format_line(result: &ProbeResult) -> String {
    format!("{} udp={}", result.addr, result.udp_capable)
}

pub fn report(report: &ScanReport, elapsed: Duration) {
    if report.interrupted {
        warn!("scan was interrupted, results are partial");
    }

    let proxies = sorted_proxies(report);
    if !proxies.is_empty() {
        header("open socks5 proxies");
        for proxy in &proxies {
            success!("{}", format_line(proxy));
        }
    }

    info!(
        "{} of {} alive endpoints verified in {:.2}s",
        report.results.len(),
        report.alive.len(),
        elapsed.as_secs_f64()
    );
    info!("total {} proxies", proxies.len());
}

pub fn render_report(report: &ScanReport) -> String {
    let mut out = String::new();
    for proxy in sorted_proxies(report) {
        let _ = writeln!(out, "{}", format_line(&proxy));
    }
    out
}

pub fn write_report(path: &Path, report: &ScanReport) -> anyhow::Result<()> {
    std::fs::write(path, render_report(report))
        .with_context(|| format!("writing results to {}", path.display()))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
