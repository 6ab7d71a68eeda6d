use super::{ApiResponse, HttpRequest, HttpResponse};
use crate::firewall::BanScheduler;
use crate::utils::format_utils::format_mac;
use lanshield_common::HostRateStats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Per-host entry of the rates response
#[derive(Serialize, Deserialize)]
pub struct HostInfo {
    pub mac: String,
    pub rate_kb: i64,
    pub sampled_tick: u64,
    pub window_filled: bool,
    pub banned: bool,
}

#[derive(Serialize, Deserialize)]
pub struct HostsResponse {
    pub hosts: Vec<HostInfo>,
}

#[derive(Clone)]
pub struct MonitorApiHandler {
    rate_stats: Arc<Mutex<HashMap<[u8; 6], HostRateStats>>>,
    scheduler: Arc<BanScheduler>,
}

impl MonitorApiHandler {
    pub fn new(
        rate_stats: Arc<Mutex<HashMap<[u8; 6], HostRateStats>>>,
        scheduler: Arc<BanScheduler>,
    ) -> Self {
        Self {
            rate_stats,
            scheduler,
        }
    }

    pub fn supported_routes(&self) -> Vec<&'static str> {
        vec!["/api/hosts"]
    }

    pub async fn handle_request(&self, request: &HttpRequest) -> Result<HttpResponse, anyhow::Error> {
        if request.method != "GET" {
            return Ok(HttpResponse::error(400, "Only GET is supported".to_string()));
        }

        let banned = self.scheduler.banned_macs();
        let mut hosts: Vec<HostInfo> = {
            let stats = self.rate_stats.lock().unwrap();
            stats
                .iter()
                .map(|(mac, entry)| HostInfo {
                    mac: format_mac(mac),
                    rate_kb: entry.rate_kb,
                    sampled_tick: entry.sampled_tick,
                    window_filled: entry.window_filled,
                    banned: banned.contains(mac),
                })
                .collect()
        };
        hosts.sort_by(|a, b| a.mac.cmp(&b.mac));

        let body = serde_json::to_string(&ApiResponse::success(HostsResponse { hosts }))?;
        Ok(HttpResponse::ok(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firewall::MitigationConfig;
    use crate::net::memory::MemoryNetwork;
    use crate::net::{HostDirectory, RuleService};

    #[tokio::test]
    async fn test_hosts_response_sorted_and_flagged() {
        let net = Arc::new(MemoryNetwork::new());
        let scheduler = Arc::new(BanScheduler::new(
            MitigationConfig::default(),
            Arc::clone(&net) as Arc<dyn HostDirectory>,
            Arc::clone(&net) as Arc<dyn RuleService>,
        ));

        let rate_stats = Arc::new(Mutex::new(HashMap::new()));
        {
            let mut stats = rate_stats.lock().unwrap();
            stats.insert(
                [0xbb, 0, 0, 0, 0, 2],
                HostRateStats {
                    rate_kb: 20,
                    sampled_tick: 4,
                    window_filled: true,
                },
            );
            stats.insert(
                [0xaa, 0, 0, 0, 0, 1],
                HostRateStats {
                    rate_kb: 10,
                    sampled_tick: 4,
                    window_filled: false,
                },
            );
        }

        let handler = MonitorApiHandler::new(rate_stats, scheduler);
        let request = HttpRequest {
            method: "GET".to_string(),
            path: "/api/hosts".to_string(),
            query_params: HashMap::new(),
            body: None,
        };

        let response = handler.handle_request(&request).await.unwrap();
        assert_eq!(response.status, 200);

        let parsed: ApiResponse<HostsResponse> = serde_json::from_str(&response.body).unwrap();
        let hosts = parsed.data.unwrap().hosts;
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].mac, "aa:00:00:00:00:01");
        assert!(!hosts[0].banned);
        assert_eq!(hosts[1].rate_kb, 20);
    }
}
