use crate::firewall::MitigationConfig;
use crate::net::{DropRule, KnownHost, RuleService};
use crate::utils::format_utils::format_mac;
use anyhow::{Context, Result};
use std::time::Duration;

/// Application identity stamped on every rule this service owns.
pub const APP_NAME: &str = "lanshield";

/// Priority band of the baseline path-setup rules owned by the forwarding
/// layer. Drop rules must sit strictly above it so that a ban always wins
/// over an existing forwarding path for the same traffic.
pub const BASELINE_PRIORITY: i32 = 100;
pub const MITIGATION_PRIORITY: i32 = 200;

const INSTALL_ATTEMPTS: u32 = 3;
const INSTALL_RETRY_DELAY_MS: u64 = 500;

/// Deduplication key for the drop rule covering one host pair. The "ban"
/// suffix keeps these keys disjoint from baseline forwarding keys, which
/// are built from the bare host pair.
pub fn ban_rule_key(src: &[u8; 6], dst: &[u8; 6]) -> String {
    format!("{}{}ban", format_mac(src), format_mac(dst))
}

/// One drop rule per (banned host, other known host) pair, matching the
/// banned MAC as source only.
pub fn build_ban_rules(mac: &[u8; 6], peers: &[KnownHost]) -> Vec<DropRule> {
    peers
        .iter()
        .filter(|peer| peer.mac != *mac)
        .map(|peer| DropRule {
            key: ban_rule_key(mac, &peer.mac),
            src_mac: *mac,
            dst_mac: peer.mac,
            priority: MITIGATION_PRIORITY,
            app: APP_NAME.to_string(),
        })
        .collect()
}

/// Submit the full fan-out of drop rules for a ban. Submission failures are
/// retried a bounded number of times; rules that still fail are reported
/// and excluded from the returned set, so the withdraw phase only ever
/// touches rules that were actually accepted.
pub async fn install_ban(service: &dyn RuleService, mac: &[u8; 6], peers: &[KnownHost]) -> Vec<DropRule> {
    let mut installed = Vec::new();
    for rule in build_ban_rules(mac, peers) {
        match submit_with_retry(service, &rule).await {
            Ok(()) => installed.push(rule),
            Err(e) => log::error!(
                "Giving up on drop rule {} for {}: {}",
                rule.key,
                format_mac(mac),
                e
            ),
        }
    }
    installed
}

async fn submit_with_retry(service: &dyn RuleService, rule: &DropRule) -> Result<()> {
    let mut last_err = None;
    for attempt in 1..=INSTALL_ATTEMPTS {
        match service.submit(rule) {
            Ok(()) => return Ok(()),
            Err(e) => {
                log::warn!(
                    "Submitting drop rule {} failed (attempt {}/{}): {}",
                    rule.key,
                    attempt,
                    INSTALL_ATTEMPTS,
                    e
                );
                last_err = Some(e);
                if attempt < INSTALL_ATTEMPTS {
                    tokio::time::sleep(Duration::from_millis(
                        INSTALL_RETRY_DELAY_MS * attempt as u64,
                    ))
                    .await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("rule submission failed")))
}

/// Request withdrawal of a rule, wait until the service reports a terminal
/// state, then purge it. The wait polls at a bounded interval and gives up
/// after the configured timeout; a rule that never reaches a terminal state
/// is left in place and reported, never purged.
pub async fn withdraw_and_purge(
    service: &dyn RuleService,
    rule: &DropRule,
    config: &MitigationConfig,
) -> Result<()> {
    service
        .withdraw(&rule.key)
        .with_context(|| format!("failed to request withdrawal of rule {}", rule.key))?;

    let wait = tokio::time::timeout(
        Duration::from_secs(config.withdraw_timeout_secs),
        wait_terminal(service, &rule.key, config.rule_poll_ms),
    );
    match wait.await {
        Ok(still_resolvable) => {
            if still_resolvable {
                service
                    .purge(&rule.key)
                    .with_context(|| format!("failed to purge rule {}", rule.key))?;
            }
            Ok(())
        }
        Err(_) => Err(anyhow::anyhow!(
            "rule {} did not reach a terminal state within {}s, leaving it unpurged",
            rule.key,
            config.withdraw_timeout_secs
        )),
    }
}

/// Poll until the rule is purgeable. Returns false if the key stopped being
/// resolvable along the way, meaning there is nothing left to purge.
async fn wait_terminal(service: &dyn RuleService, key: &str, poll_ms: u64) -> bool {
    loop {
        match service.rule_state(key) {
            None => return false,
            Some(state) if state.purgeable() => return true,
            Some(_) => tokio::time::sleep(Duration::from_millis(poll_ms)).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{HostLocation, RuleState};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const ATTACKER: [u8; 6] = [0xaa, 0, 0, 0, 0, 0x01];

    fn peers(count: u8) -> Vec<KnownHost> {
        (0..count)
            .map(|i| KnownHost {
                mac: [0xbb, 0, 0, 0, 0, i],
                location: HostLocation {
                    device: "of:0000000000000001".to_string(),
                    port: i as u32 + 1,
                },
            })
            .collect()
    }

    /// Rule service fake with a scripted state sequence and a call journal.
    struct ScriptedRules {
        calls: Mutex<Vec<String>>,
        submit_failures: Mutex<u32>,
        states: Mutex<VecDeque<Option<RuleState>>>,
    }

    impl ScriptedRules {
        fn new(submit_failures: u32, states: Vec<Option<RuleState>>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                submit_failures: Mutex::new(submit_failures),
                states: Mutex::new(states.into()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RuleService for ScriptedRules {
        fn submit(&self, rule: &DropRule) -> Result<()> {
            self.calls.lock().unwrap().push(format!("submit {}", rule.key));
            let mut failures = self.submit_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(anyhow::anyhow!("controller unavailable"));
            }
            Ok(())
        }

        fn withdraw(&self, key: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("withdraw {}", key));
            Ok(())
        }

        fn rule_state(&self, key: &str) -> Option<RuleState> {
            self.calls.lock().unwrap().push(format!("state {}", key));
            let mut states = self.states.lock().unwrap();
            states.pop_front().unwrap_or(Some(RuleState::Active))
        }

        fn purge(&self, key: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("purge {}", key));
            Ok(())
        }
    }

    #[test]
    fn test_fan_out_excludes_banned_host() {
        let mut all = peers(3);
        all.push(KnownHost {
            mac: ATTACKER,
            location: HostLocation {
                device: "of:0000000000000001".to_string(),
                port: 9,
            },
        });

        let rules = build_ban_rules(&ATTACKER, &all);
        assert_eq!(rules.len(), 3);
        for rule in &rules {
            assert_eq!(rule.src_mac, ATTACKER);
            assert_ne!(rule.dst_mac, ATTACKER);
            assert!(rule.priority > BASELINE_PRIORITY);
            assert!(rule.key.ends_with("ban"));
        }
    }

    #[test]
    fn test_ban_keys_unique_per_pair() {
        let rules = build_ban_rules(&ATTACKER, &peers(4));
        let mut keys: Vec<_> = rules.iter().map(|r| r.key.clone()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_retries_then_succeeds() {
        let service = ScriptedRules::new(2, vec![]);
        let installed = install_ban(&service, &ATTACKER, &peers(1)).await;

        assert_eq!(installed.len(), 1);
        let submits = service
            .calls()
            .iter()
            .filter(|c| c.starts_with("submit"))
            .count();
        assert_eq!(submits, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_reports_permanent_failure() {
        // More failures than the retry limit: the rule is dropped from the
        // installed set instead of being assumed active.
        let service = ScriptedRules::new(u32::MAX, vec![]);
        let installed = install_ban(&service, &ATTACKER, &peers(1)).await;
        assert!(installed.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_withdraw_polls_until_terminal_before_purge() {
        let service = ScriptedRules::new(
            0,
            vec![
                Some(RuleState::Withdrawing),
                Some(RuleState::Withdrawing),
                Some(RuleState::Withdrawn),
            ],
        );
        let rule = build_ban_rules(&ATTACKER, &peers(1)).remove(0);
        let config = MitigationConfig::default();

        withdraw_and_purge(&service, &rule, &config).await.unwrap();

        let calls = service.calls();
        assert_eq!(calls[0], format!("withdraw {}", rule.key));
        let purge_pos = calls.iter().position(|c| c.starts_with("purge")).unwrap();
        // Every observation before the purge that reported a state saw a
        // non-terminal one except the last.
        assert_eq!(calls[purge_pos - 1], format!("state {}", rule.key));
        assert_eq!(
            calls.iter().filter(|c| c.starts_with("state")).count(),
            3
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_withdraw_skips_purge_for_vanished_rule() {
        let service = ScriptedRules::new(0, vec![None]);
        let rule = build_ban_rules(&ATTACKER, &peers(1)).remove(0);
        let config = MitigationConfig::default();

        withdraw_and_purge(&service, &rule, &config).await.unwrap();
        assert!(!service.calls().iter().any(|c| c.starts_with("purge")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_withdrawal_times_out_without_purge() {
        // rule_state keeps answering Active forever.
        let service = ScriptedRules::new(0, vec![]);
        let rule = build_ban_rules(&ATTACKER, &peers(1)).remove(0);
        let config = MitigationConfig {
            withdraw_timeout_secs: 5,
            ..MitigationConfig::default()
        };

        let result = withdraw_and_purge(&service, &rule, &config).await;
        assert!(result.is_err());
        assert!(!service.calls().iter().any(|c| c.starts_with("purge")));
    }
}
