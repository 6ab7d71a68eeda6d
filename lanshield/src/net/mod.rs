pub mod memory;

use std::fmt;

/// Attachment point of a host: the switch it hangs off and the port number
/// on that switch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostLocation {
    pub device: String,
    pub port: u32,
}

impl fmt::Display for HostLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.port)
    }
}

/// A host as reported by the directory: stable MAC identity plus where it is
/// currently attached.
#[derive(Debug, Clone)]
pub struct KnownHost {
    pub mac: [u8; 6],
    pub location: HostLocation,
}

/// Lifecycle states the rule service reports for a submitted rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    Installing,
    Active,
    Withdrawing,
    Withdrawn,
    Failed,
}

impl RuleState {
    /// States from which a rule may be purged. Purging a rule in any other
    /// state would leave its hardware entries dangling.
    pub fn purgeable(self) -> bool {
        matches!(self, RuleState::Withdrawn | RuleState::Failed)
    }
}

/// One drop rule covering a single (source, destination) host pair.
///
/// Only the source MAC is matched, so the block applies to traffic *from*
/// the source host regardless of what the destination sends back.
#[derive(Debug, Clone)]
pub struct DropRule {
    /// Deduplication key, unique per rule across the whole application.
    pub key: String,
    pub src_mac: [u8; 6],
    pub dst_mac: [u8; 6],
    pub priority: i32,
    /// Owning application identity, recorded on the rule by the service.
    pub app: String,
}

/// Per-port byte counters maintained by the switch layer.
pub trait CounterSource: Send + Sync {
    /// Bytes seen at the attachment point since the previous reading.
    /// Returns `None` when the location produced no statistics this tick;
    /// callers must skip the host and try again next tick.
    fn bytes_since_last(&self, location: &HostLocation) -> Option<u64>;
}

/// Inventory of hosts currently known to the network layer.
pub trait HostDirectory: Send + Sync {
    fn known_hosts(&self) -> Vec<KnownHost>;
}

/// Rule management service of the network layer.
///
/// Submission is fire-and-forget: `submit` returns once the rule has been
/// accepted, not once it is active on hardware. State transitions are
/// observed through `rule_state`, and `purge` is only legal once the rule
/// has reached a purgeable state.
pub trait RuleService: Send + Sync {
    fn submit(&self, rule: &DropRule) -> Result<(), anyhow::Error>;
    fn withdraw(&self, key: &str) -> Result<(), anyhow::Error>;
    /// `None` means the key is not (or no longer) resolvable.
    fn rule_state(&self, key: &str) -> Option<RuleState>;
    fn purge(&self, key: &str) -> Result<(), anyhow::Error>;
}
