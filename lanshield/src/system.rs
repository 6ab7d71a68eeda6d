use crate::command::Options;
use log::{info, warn};
use std::env;
use std::fs;

// ---- Startup diagnostics ----
fn read_first_line(path: &str) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.lines().next().map(|l| l.trim().to_string()))
}

fn kernel_version() -> Option<String> {
    // Prefer concise output first
    if let Ok(out) = std::process::Command::new("uname").args(["-sr"]).output() {
        if let Ok(s) = String::from_utf8(out.stdout) {
            return Some(s.trim().to_string());
        }
    }
    // Fallback to /proc/version (verbose)
    read_first_line("/proc/version")
}

fn hostname() -> Option<String> {
    if let Some(h) = read_first_line("/proc/sys/kernel/hostname") {
        return Some(h);
    }
    read_first_line("/etc/hostname")
}

pub fn log_startup_info(options: &Options) {
    let app_version = env!("CARGO_PKG_VERSION");
    let cwd = env::current_dir()
        .ok()
        .and_then(|p| p.to_str().map(|s| s.to_string()))
        .unwrap_or_default();
    let kver = kernel_version().unwrap_or_else(|| "unknown".to_string());
    let host = hostname().unwrap_or_else(|| "unknown".to_string());

    info!("lanshield v{} started", app_version);
    info!("Host: {}", host);
    info!("OS: {} ({})", env::consts::OS, env::consts::ARCH);
    info!("Kernel: {}", kver);
    info!("Working directory: {}", cwd);
    info!("Listening port: {}", options.port());
    info!("Tick period: {}s", options.tick_secs());
    info!(
        "Detection window: {} cycles of {} KB (flag above {} KB)",
        options.num_cycles(),
        options.bandwidth_kb(),
        options.bandwidth_kb() * options.num_cycles() as i64
    );
    info!(
        "Ban duration: {}s (rule poll {}ms, withdraw timeout {}s)",
        options.ban_secs(),
        options.rule_poll_ms(),
        options.withdraw_timeout_secs()
    );

    match options.hosts_file() {
        Some(path) => info!("Hosts file: {}", path),
        None => warn!("No hosts file given, the host directory starts empty"),
    }
}
