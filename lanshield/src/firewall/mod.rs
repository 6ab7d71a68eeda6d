pub mod rules;

use crate::command::Options;
use crate::net::{HostDirectory, RuleService};
use crate::utils::format_utils::format_mac;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Mitigation settings
#[derive(Debug, Clone)]
pub struct MitigationConfig {
    /// How long a flagged host stays banned (seconds).
    pub ban_secs: u64,
    /// Poll interval while waiting for a rule to reach a terminal state.
    pub rule_poll_ms: u64,
    /// Give up waiting for a terminal rule state after this long.
    pub withdraw_timeout_secs: u64,
}

impl Default for MitigationConfig {
    fn default() -> Self {
        Self {
            ban_secs: 10,
            rule_poll_ms: 200,
            withdraw_timeout_secs: 30,
        }
    }
}

impl MitigationConfig {
    pub fn from_options(options: &Options) -> Self {
        Self {
            ban_secs: options.ban_secs(),
            rule_poll_ms: options.rule_poll_ms(),
            withdraw_timeout_secs: options.withdraw_timeout_secs(),
        }
    }
}

/// Result of an administrative unban request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnbanOutcome {
    /// The ban timer was cancelled; the lifecycle proceeds to withdrawal.
    Cancelled,
    /// No active ban for that MAC; nothing to do.
    NotBanned,
}

/// Bookkeeping for one active ban.
struct BanRecord {
    started_tick: u64,
    /// Cancellation signal for the ban timer. Withdrawal still runs in full
    /// after a cancel, only the wait is cut short.
    cancel: Arc<Notify>,
    /// Handle of the lifecycle task, taken by `drain` on shutdown.
    task: Option<JoinHandle<()>>,
}

/// Owns the banned set and drives each ban's lifecycle on its own task.
///
/// The banned map is the only state shared between the per-tick sweep and
/// the ban lifecycles; every membership check and mutation goes through its
/// mutex, so a host can never acquire two concurrent lifecycles.
pub struct BanScheduler {
    config: MitigationConfig,
    hosts: Arc<dyn HostDirectory>,
    rules: Arc<dyn RuleService>,
    banned: Mutex<HashMap<[u8; 6], BanRecord>>,
}

impl BanScheduler {
    pub fn new(
        config: MitigationConfig,
        hosts: Arc<dyn HostDirectory>,
        rules: Arc<dyn RuleService>,
    ) -> Self {
        Self {
            config,
            hosts,
            rules,
            banned: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_banned(&self, mac: &[u8; 6]) -> bool {
        self.banned.lock().unwrap().contains_key(mac)
    }

    /// Current banned set, sorted for stable output.
    pub fn banned_macs(&self) -> Vec<[u8; 6]> {
        let mut macs: Vec<[u8; 6]> = self.banned.lock().unwrap().keys().copied().collect();
        macs.sort();
        macs
    }

    /// Banned set with the tick each ban started at, sorted by MAC.
    pub fn banned_entries(&self) -> Vec<([u8; 6], u64)> {
        let banned = self.banned.lock().unwrap();
        let mut entries: Vec<([u8; 6], u64)> = banned
            .iter()
            .map(|(mac, record)| (*mac, record.started_tick))
            .collect();
        entries.sort_by_key(|(mac, _)| *mac);
        entries
    }

    /// Start a ban lifecycle for a flagged host. Returns false without side
    /// effects if the host already has an active lifecycle.
    pub fn schedule(self: &Arc<Self>, mac: [u8; 6], tick: u64) -> bool {
        let mut banned = self.banned.lock().unwrap();
        if banned.contains_key(&mac) {
            return false;
        }

        log::warn!("Possible DoS detected, going to ban {}", format_mac(&mac));

        let cancel = Arc::new(Notify::new());
        let task = tokio::spawn({
            let scheduler = Arc::clone(self);
            let cancel = Arc::clone(&cancel);
            async move {
                scheduler.run_ban(mac, cancel).await;
            }
        });

        banned.insert(
            mac,
            BanRecord {
                started_tick: tick,
                cancel,
                task: Some(task),
            },
        );
        true
    }

    /// Administrative unban: cancel the ban timer early. The lifecycle still
    /// withdraws and purges every installed rule before the host clears.
    pub fn request_unban(&self, mac: &[u8; 6]) -> UnbanOutcome {
        let banned = self.banned.lock().unwrap();
        match banned.get(mac) {
            Some(record) => {
                record.cancel.notify_one();
                UnbanOutcome::Cancelled
            }
            None => UnbanOutcome::NotBanned,
        }
    }

    /// Await every outstanding ban lifecycle. Called on shutdown so that
    /// installed drop rules are always withdrawn before the process exits.
    pub async fn drain(&self) {
        let handles: Vec<([u8; 6], JoinHandle<()>)> = {
            let mut banned = self.banned.lock().unwrap();
            banned
                .iter_mut()
                .filter_map(|(mac, record)| record.task.take().map(|task| (*mac, task)))
                .collect()
        };

        for (mac, task) in handles {
            if let Err(e) = task.await {
                log::error!("Ban lifecycle for {} ended abnormally: {}", format_mac(&mac), e);
            }
        }
    }

    /// The full lifecycle of one ban: install the drop-rule fan-out, hold
    /// for the ban duration (or until cancelled), then withdraw and purge
    /// every rule that was installed, and finally clear the host.
    async fn run_ban(&self, mac: [u8; 6], cancel: Arc<Notify>) {
        let peers = self.hosts.known_hosts();
        let installed = rules::install_ban(&*self.rules, &mac, &peers).await;
        log::info!(
            "Installed {} drop rules for {}",
            installed.len(),
            format_mac(&mac)
        );

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(self.config.ban_secs)) => {
                log::warn!("Ban time expired, going to unban {}", format_mac(&mac));
            }
            _ = cancel.notified() => {
                log::warn!("Unban requested, lifting ban on {} early", format_mac(&mac));
            }
        }

        for rule in &installed {
            if let Err(e) = rules::withdraw_and_purge(&*self.rules, rule, &self.config).await {
                log::error!("Failed to retire drop rule {}: {}", rule.key, e);
            }
        }

        self.banned.lock().unwrap().remove(&mac);
    }
}
