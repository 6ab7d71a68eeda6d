pub mod rate;

use crate::command::Options;
use crate::firewall::BanScheduler;
use crate::net::{CounterSource, HostDirectory};
use lanshield_common::HostRateStats;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Detection settings for the rate monitor.
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Per-cycle traffic allowance per host, in KB.
    pub bandwidth_kb: i64,
    /// Detection window length in cycles.
    pub num_cycles: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            bandwidth_kb: 140,
            num_cycles: 5,
        }
    }
}

impl DetectionConfig {
    pub fn from_options(options: &Options) -> Self {
        Self {
            bandwidth_kb: options.bandwidth_kb(),
            num_cycles: options.num_cycles(),
        }
    }

    /// A host is flagged when the difference between its newest and oldest
    /// retained sample exceeds this many KB.
    pub fn threshold_kb(&self) -> i64 {
        self.bandwidth_kb * self.num_cycles as i64
    }
}

/// Shared state and collaborator handles for the monitoring module.
pub struct MonitorContext {
    pub detection: DetectionConfig,
    /// Control loop tick period in seconds.
    pub tick_secs: u64,
    /// Whether to render the per-tick host table on stdout.
    pub console: bool,
    pub rate_stats: Arc<Mutex<HashMap<[u8; 6], HostRateStats>>>,
    pub hosts: Arc<dyn HostDirectory>,
    pub counters: Arc<dyn CounterSource>,
    pub scheduler: Arc<BanScheduler>,
}

impl MonitorContext {
    pub fn new(
        options: &Options,
        rate_stats: Arc<Mutex<HashMap<[u8; 6], HostRateStats>>>,
        hosts: Arc<dyn HostDirectory>,
        counters: Arc<dyn CounterSource>,
        scheduler: Arc<BanScheduler>,
    ) -> Self {
        Self {
            detection: DetectionConfig::from_options(options),
            tick_secs: options.tick_secs(),
            console: options.console(),
            rate_stats,
            hosts,
            counters,
            scheduler,
        }
    }
}
