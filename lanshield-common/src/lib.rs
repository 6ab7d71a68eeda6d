#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-host traffic sample as seen by the rate monitor.
///
/// One record per MAC address, refreshed once per control-loop tick and
/// shared read-only with the display and API layers.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HostRateStats {
    /// Kilobytes observed for this host since the previous tick.
    pub rate_kb: i64,
    /// Control-loop tick at which `rate_kb` was sampled.
    pub sampled_tick: u64,
    /// Whether a full detection window of samples has accumulated.
    pub window_filled: bool,
}

impl Default for HostRateStats {
    fn default() -> Self {
        Self {
            rate_kb: 0,
            sampled_tick: 0,
            window_filled: false,
        }
    }
}
