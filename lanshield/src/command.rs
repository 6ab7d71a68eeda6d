use crate::api::{ApiHandler, ApiRouter};
use crate::firewall::{BanScheduler, MitigationConfig};
use crate::monitor::rate::RateMonitor;
use crate::monitor::MonitorContext;
use crate::net::memory::MemoryNetwork;
use crate::net::{CounterSource, HostDirectory, RuleService};
use crate::system::log_startup_info;
use crate::web;
use clap::{Args, Parser};
use log::info;
use log::LevelFilter;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::signal;
use tokio::sync::Notify;

/// Common arguments
#[derive(Debug, Args, Clone)]
pub struct CommonArgs {
    #[clap(long, default_value = "8686", help = "Web server listening port")]
    pub port: u16,

    #[clap(
        long,
        help = "JSON file of known hosts ({mac, device, port} records) to seed the host directory"
    )]
    pub hosts_file: Option<String>,

    #[clap(
        long,
        default_value = "false",
        help = "Render a per-tick host table on stdout"
    )]
    pub console: bool,

    #[clap(
        long,
        default_value = "false",
        help = "Enable web request logging (per-HTTP-request line)"
    )]
    pub web_log: bool,
}

/// Detection arguments
#[derive(Debug, Args, Clone)]
pub struct DetectionArgs {
    #[clap(
        long,
        default_value = "140",
        help = "Per-cycle traffic allowance per host (KB); a host is flagged when its rate outgrows this over the window"
    )]
    pub bandwidth_kb: i64,

    #[clap(long, default_value = "5", help = "Detection window length in cycles")]
    pub num_cycles: usize,

    #[clap(long, default_value = "3", help = "Control loop tick period (seconds)")]
    pub tick_secs: u64,
}

/// Mitigation arguments
#[derive(Debug, Args, Clone)]
pub struct MitigationArgs {
    #[clap(long, default_value = "10", help = "Ban duration (seconds)")]
    pub ban_secs: u64,

    #[clap(
        long,
        default_value = "200",
        help = "Poll interval while waiting for a withdrawn rule to reach a terminal state (milliseconds)"
    )]
    pub rule_poll_ms: u64,

    #[clap(
        long,
        default_value = "30",
        help = "Give up waiting for a terminal rule state after this long (seconds)"
    )]
    pub withdraw_timeout_secs: u64,
}

#[derive(Debug, Parser, Clone)]
#[clap(name = "lanshield")]
#[clap(version = env!("CARGO_PKG_VERSION"))]
#[clap(about = "Reactive DoS detection and mitigation for switched networks")]
pub struct Options {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[clap(flatten)]
    pub detection: DetectionArgs,

    #[clap(flatten)]
    pub mitigation: MitigationArgs,
}

impl Options {
    pub fn port(&self) -> u16 {
        self.common.port
    }

    pub fn hosts_file(&self) -> Option<&str> {
        self.common.hosts_file.as_deref()
    }

    pub fn console(&self) -> bool {
        self.common.console
    }

    pub fn web_log(&self) -> bool {
        self.common.web_log
    }

    pub fn bandwidth_kb(&self) -> i64 {
        self.detection.bandwidth_kb
    }

    pub fn num_cycles(&self) -> usize {
        self.detection.num_cycles
    }

    pub fn tick_secs(&self) -> u64 {
        self.detection.tick_secs
    }

    pub fn ban_secs(&self) -> u64 {
        self.mitigation.ban_secs
    }

    pub fn rule_poll_ms(&self) -> u64 {
        self.mitigation.rule_poll_ms
    }

    pub fn withdraw_timeout_secs(&self) -> u64 {
        self.mitigation.withdraw_timeout_secs
    }
}

// Validate arguments
fn validate_arguments(opt: &Options) -> Result<(), anyhow::Error> {
    if opt.port() == 0 {
        return Err(anyhow::anyhow!("Port number cannot be 0"));
    }

    if opt.bandwidth_kb() <= 0 {
        return Err(anyhow::anyhow!("bandwidth_kb must be greater than 0"));
    }

    if opt.num_cycles() < 2 {
        return Err(anyhow::anyhow!(
            "num_cycles must be at least 2 so a window has an oldest and a newest sample"
        ));
    }

    if opt.tick_secs() == 0 {
        return Err(anyhow::anyhow!("tick_secs must be greater than 0"));
    }

    if opt.ban_secs() == 0 {
        return Err(anyhow::anyhow!("ban_secs must be greater than 0"));
    }

    if opt.rule_poll_ms() == 0 {
        return Err(anyhow::anyhow!("rule_poll_ms must be greater than 0"));
    }

    if opt.withdraw_timeout_secs() == 0 {
        return Err(anyhow::anyhow!(
            "withdraw_timeout_secs must be greater than 0"
        ));
    }

    Ok(())
}

// Run service: wire the backend, start the web server and the control loop
async fn run_service(options: &Options) -> Result<(), anyhow::Error> {
    // Use Notify for graceful shutdown
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, gracefully shutting down...");
            shutdown_notify_clone.notify_waiters();
        }
    });

    // In-process network backend. Controller-backed implementations of the
    // collaborator traits plug in at this seam.
    let network = Arc::new(MemoryNetwork::new());
    if let Some(path) = options.hosts_file() {
        let count = network.load_hosts_file(path)?;
        info!("Seeded {} known hosts from {}", count, path);
    }

    let rate_stats = Arc::new(Mutex::new(HashMap::new()));
    let scheduler = Arc::new(BanScheduler::new(
        MitigationConfig::from_options(options),
        Arc::clone(&network) as Arc<dyn HostDirectory>,
        Arc::clone(&network) as Arc<dyn RuleService>,
    ));

    let mut api_router = ApiRouter::new();
    api_router.register_handler(ApiHandler::Monitor(crate::api::monitor::MonitorApiHandler::new(
        Arc::clone(&rate_stats),
        Arc::clone(&scheduler),
    )));
    api_router.register_handler(ApiHandler::Firewall(
        crate::api::firewall::FirewallApiHandler::new(Arc::clone(&scheduler)),
    ));

    let options_for_web = options.clone();
    let shutdown_notify_for_web = shutdown_notify.clone();
    let web_task = tokio::spawn(async move {
        if let Err(e) = web::start_server(options_for_web, api_router, shutdown_notify_for_web).await
        {
            log::error!("Web server error: {}", e);
        }
    });

    let ctx = MonitorContext::new(
        options,
        Arc::clone(&rate_stats),
        Arc::clone(&network) as Arc<dyn HostDirectory>,
        Arc::clone(&network) as Arc<dyn CounterSource>,
        Arc::clone(&scheduler),
    );
    let monitor = RateMonitor::new(ctx);
    let shutdown_notify_for_monitor = shutdown_notify.clone();
    let monitor_task = tokio::spawn(async move {
        if let Err(e) = monitor.start(shutdown_notify_for_monitor).await {
            log::error!("Rate monitor error: {}", e);
        }
    });

    // Wait for shutdown signal
    shutdown_notify.notified().await;
    info!("Stopping monitor and API server...");

    for task in [monitor_task, web_task] {
        if let Err(e) = task.await {
            log::error!("Task error: {}", e);
        }
    }

    // Stopping the loop never cancels in-flight bans; wait for every ban
    // lifecycle to withdraw and purge its rules before exiting.
    scheduler.drain().await;

    info!("All tasks stopped, program exiting");
    Ok(())
}

pub async fn run(options: Options) -> Result<(), anyhow::Error> {
    // Validate arguments
    validate_arguments(&options)?;

    // Set up logging
    env_logger::Builder::new()
        .filter(None, LevelFilter::Info)
        .target(env_logger::Target::Stdout)
        .init();

    // Startup diagnostics
    log_startup_info(&options);

    // Run service
    run_service(&options).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse_and_validate() {
        let options = Options::try_parse_from(["lanshield"]).unwrap();
        assert_eq!(options.bandwidth_kb(), 140);
        assert_eq!(options.num_cycles(), 5);
        assert_eq!(options.tick_secs(), 3);
        assert_eq!(options.ban_secs(), 10);
        assert!(validate_arguments(&options).is_ok());
    }

    #[test]
    fn test_validate_rejects_degenerate_window() {
        let options =
            Options::try_parse_from(["lanshield", "--num-cycles", "1"]).unwrap();
        assert!(validate_arguments(&options).is_err());

        let options = Options::try_parse_from(["lanshield", "--port", "0"]).unwrap();
        assert!(validate_arguments(&options).is_err());
    }
}
