use crate::display;
use crate::monitor::MonitorContext;
use crate::storage::samples::SampleStore;
use crate::utils::format_utils::format_mac;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Traffic-rate anomaly detector and the control loop driving it.
///
/// Once per tick the monitor reads every known host's byte counter,
/// records the rate, and flags hosts whose rate jumped anomalously within
/// the detection window. Flagged hosts are handed to the ban scheduler;
/// everything else about a ban happens on the scheduler's tasks, so a slow
/// withdrawal can never hold up detection.
pub struct RateMonitor {
    ctx: MonitorContext,
    samples: SampleStore,
}

impl RateMonitor {
    pub fn new(ctx: MonitorContext) -> Self {
        let samples = SampleStore::new(ctx.detection.num_cycles);
        Self { ctx, samples }
    }

    /// One sweep over all known hosts. Returns the hosts newly flagged this
    /// tick, in host-directory order.
    ///
    /// The heuristic compares the newest sample against the oldest retained
    /// one: `current - oldest > bandwidth * num_cycles`, strict. This is a
    /// two-point comparison, not a windowed sum, so one big sample swing is
    /// enough to flag a host.
    pub fn sweep(&mut self, tick: u64) -> Vec<[u8; 6]> {
        let mut flagged = Vec::new();
        let threshold = self.ctx.detection.threshold_kb();
        let hosts = self.ctx.hosts.known_hosts();

        let mut stats_map = self.ctx.rate_stats.lock().unwrap();
        for host in &hosts {
            let Some(bytes) = self.ctx.counters.bytes_since_last(&host.location) else {
                // No reading for this attachment point this tick. Leave the
                // host's history as it is and evaluate again next tick.
                log::debug!(
                    "No port statistics for {} at {}",
                    format_mac(&host.mac),
                    host.location
                );
                continue;
            };
            let rate_kb = (bytes / 1024) as i64;
            self.samples.record(tick, host.mac, rate_kb);

            let stats = stats_map.entry(host.mac).or_default();
            stats.rate_kb = rate_kb;
            stats.sampled_tick = tick;
            stats.window_filled = self.samples.window_filled(&host.mac);

            // Warm-up: no decisions until the clock has outrun the window.
            if tick <= self.ctx.detection.num_cycles as u64 {
                continue;
            }
            let (Some(current), Some(oldest)) = (
                self.samples.current(tick, &host.mac),
                self.samples.oldest(tick, &host.mac),
            ) else {
                continue;
            };

            if current - oldest > threshold && !self.ctx.scheduler.is_banned(&host.mac) {
                flagged.push(host.mac);
            }
        }
        drop(stats_map);

        if !flagged.is_empty() {
            let names: Vec<String> = flagged.iter().map(|mac| format_mac(mac)).collect();
            log::info!("Tick {}: flagged hosts: {}", tick, names.join(", "));
        }
        flagged
    }

    /// Control loop: sweep once per tick period until told to stop. The
    /// in-flight tick always completes, and active ban lifecycles are left
    /// to run to completion on their own tasks.
    pub async fn start(mut self, shutdown_notify: Arc<Notify>) -> Result<()> {
        let mut interval = tokio::time::interval(Duration::from_secs(self.ctx.tick_secs));
        let mut tick: u64 = 0;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for mac in self.sweep(tick) {
                        self.ctx.scheduler.schedule(mac, tick);
                    }

                    if self.ctx.console {
                        let banned = self.ctx.scheduler.banned_macs();
                        let stats = self.ctx.rate_stats.lock().unwrap();
                        display::render(&stats, &banned);
                    }

                    tick += 1;
                }
                _ = shutdown_notify.notified() => {
                    log::info!("Rate monitor received shutdown signal, stopping...");
                    break;
                }
            }
        }

        Ok(())
    }
}
