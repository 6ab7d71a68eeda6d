use crate::net::{CounterSource, DropRule, HostDirectory, HostLocation, KnownHost, RuleService, RuleState};
use crate::utils::network_utils::parse_mac_address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;

/// In-process implementation of the network collaborator contracts.
///
/// Used as the default backend of the binary and by tests. Deployments
/// against a real controller substitute their own `CounterSource` /
/// `HostDirectory` / `RuleService` implementations at the same seam.
pub struct MemoryNetwork {
    hosts: Mutex<Vec<KnownHost>>,
    counters: Mutex<HashMap<HostLocation, u64>>,
    rules: Mutex<HashMap<String, RuleState>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HostSeedJson {
    mac: String,
    device: String,
    port: u32,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self {
            hosts: Mutex::new(Vec::new()),
            counters: Mutex::new(HashMap::new()),
            rules: Mutex::new(HashMap::new()),
        }
    }

    /// Register a host, replacing its location if the MAC is already known.
    pub fn register_host(&self, mac: [u8; 6], location: HostLocation) {
        let mut hosts = self.hosts.lock().unwrap();
        self.counters
            .lock()
            .unwrap()
            .entry(location.clone())
            .or_insert(0);

        if let Some(existing) = hosts.iter_mut().find(|h| h.mac == mac) {
            existing.location = location;
        } else {
            hosts.push(KnownHost { mac, location });
        }
    }

    /// Account traffic observed at an attachment point.
    pub fn add_bytes(&self, location: &HostLocation, bytes: u64) {
        let mut counters = self.counters.lock().unwrap();
        if let Some(total) = counters.get_mut(location) {
            *total = total.saturating_add(bytes);
        }
    }

    /// Drop the counter entry for a location entirely. The next
    /// `bytes_since_last` call reports the location as not available.
    pub fn clear_counter(&self, location: &HostLocation) {
        self.counters.lock().unwrap().remove(location);
    }

    /// Seed the host directory from a JSON file of `{mac, device, port}`
    /// records. Returns the number of hosts loaded.
    pub fn load_hosts_file(&self, path: &str) -> Result<usize> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read hosts file {}", path))?;
        let seeds = parse_hosts_json(&content)
            .with_context(|| format!("Failed to parse hosts file {}", path))?;

        let count = seeds.len();
        for (mac, location) in seeds {
            self.register_host(mac, location);
        }
        Ok(count)
    }
}

fn parse_hosts_json(content: &str) -> Result<Vec<([u8; 6], HostLocation)>> {
    let records: Vec<HostSeedJson> = serde_json::from_str(content)?;

    let mut out = Vec::new();
    for record in records {
        let mac = parse_mac_address(&record.mac)?;
        out.push((
            mac,
            HostLocation {
                device: record.device,
                port: record.port,
            },
        ));
    }
    Ok(out)
}

impl HostDirectory for MemoryNetwork {
    fn known_hosts(&self) -> Vec<KnownHost> {
        self.hosts.lock().unwrap().clone()
    }
}

impl CounterSource for MemoryNetwork {
    fn bytes_since_last(&self, location: &HostLocation) -> Option<u64> {
        let mut counters = self.counters.lock().unwrap();
        let total = counters.get_mut(location)?;
        Some(std::mem::replace(total, 0))
    }
}

impl RuleService for MemoryNetwork {
    fn submit(&self, rule: &DropRule) -> Result<()> {
        let mut rules = self.rules.lock().unwrap();
        rules.insert(rule.key.clone(), RuleState::Active);
        log::debug!(
            "Installed drop rule {} (priority {}, app {})",
            rule.key,
            rule.priority,
            rule.app
        );
        Ok(())
    }

    fn withdraw(&self, key: &str) -> Result<()> {
        let mut rules = self.rules.lock().unwrap();
        match rules.get_mut(key) {
            Some(state) => {
                *state = RuleState::Withdrawn;
                Ok(())
            }
            None => Err(anyhow::anyhow!("No rule with key {}", key)),
        }
    }

    fn rule_state(&self, key: &str) -> Option<RuleState> {
        self.rules.lock().unwrap().get(key).copied()
    }

    fn purge(&self, key: &str) -> Result<()> {
        let mut rules = self.rules.lock().unwrap();
        match rules.get(key) {
            Some(state) if state.purgeable() => {
                rules.remove(key);
                Ok(())
            }
            Some(state) => Err(anyhow::anyhow!(
                "Rule {} is still {:?}, refusing to purge",
                key,
                state
            )),
            None => Err(anyhow::anyhow!("No rule with key {}", key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(port: u32) -> HostLocation {
        HostLocation {
            device: "of:0000000000000001".to_string(),
            port,
        }
    }

    #[test]
    fn test_counters_reset_on_read() {
        let net = MemoryNetwork::new();
        net.register_host([1, 2, 3, 4, 5, 6], location(1));

        net.add_bytes(&location(1), 2048);
        assert_eq!(net.bytes_since_last(&location(1)), Some(2048));
        assert_eq!(net.bytes_since_last(&location(1)), Some(0));

        net.clear_counter(&location(1));
        assert_eq!(net.bytes_since_last(&location(1)), None);
    }

    #[test]
    fn test_purge_rejects_active_rule() {
        let net = MemoryNetwork::new();
        let rule = DropRule {
            key: "test-rule".to_string(),
            src_mac: [1, 2, 3, 4, 5, 6],
            dst_mac: [6, 5, 4, 3, 2, 1],
            priority: 200,
            app: "test".to_string(),
        };

        net.submit(&rule).unwrap();
        assert_eq!(net.rule_state("test-rule"), Some(RuleState::Active));
        assert!(net.purge("test-rule").is_err());

        net.withdraw("test-rule").unwrap();
        assert_eq!(net.rule_state("test-rule"), Some(RuleState::Withdrawn));
        net.purge("test-rule").unwrap();
        assert_eq!(net.rule_state("test-rule"), None);
    }

    #[test]
    fn test_parse_hosts_json() {
        let seeds = parse_hosts_json(
            r#"[
                {"mac": "aa:bb:cc:dd:ee:01", "device": "of:0000000000000001", "port": 1},
                {"mac": "aa:bb:cc:dd:ee:02", "device": "of:0000000000000001", "port": 2}
            ]"#,
        )
        .unwrap();

        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].0, [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]);
        assert_eq!(seeds[1].1.port, 2);

        assert!(parse_hosts_json(r#"[{"mac": "nope", "device": "d", "port": 1}]"#).is_err());
    }

    #[test]
    fn test_register_host_updates_location() {
        let net = MemoryNetwork::new();
        let mac = [0xaa, 0, 0, 0, 0, 1];

        net.register_host(mac, location(1));
        net.register_host(mac, location(7));

        let hosts = net.known_hosts();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].location.port, 7);
    }
}
