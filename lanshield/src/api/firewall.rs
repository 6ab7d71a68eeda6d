use super::{ApiResponse, HttpRequest, HttpResponse};
use crate::firewall::{BanScheduler, UnbanOutcome};
use crate::utils::format_utils::format_mac;
use crate::utils::network_utils::parse_mac_address;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// One entry of the banned-set response
#[derive(Serialize, Deserialize)]
pub struct BannedHost {
    pub mac: String,
    pub since_tick: u64,
}

#[derive(Serialize, Deserialize)]
pub struct BannedResponse {
    pub banned: Vec<BannedHost>,
}

#[derive(Serialize, Deserialize)]
pub struct UnbanResponse {
    pub mac: String,
    pub cancelled: bool,
}

#[derive(Clone)]
pub struct FirewallApiHandler {
    scheduler: Arc<BanScheduler>,
}

impl FirewallApiHandler {
    pub fn new(scheduler: Arc<BanScheduler>) -> Self {
        Self { scheduler }
    }

    pub fn supported_routes(&self) -> Vec<&'static str> {
        vec!["/api/banned", "/api/unban"]
    }

    pub async fn handle_request(&self, request: &HttpRequest) -> Result<HttpResponse, anyhow::Error> {
        match (request.method.as_str(), request.path.as_str()) {
            ("GET", "/api/banned") => self.handle_banned(),
            ("POST", "/api/unban") => self.handle_unban(request),
            _ => Ok(HttpResponse::not_found()),
        }
    }

    fn handle_banned(&self) -> Result<HttpResponse, anyhow::Error> {
        let banned = self
            .scheduler
            .banned_entries()
            .into_iter()
            .map(|(mac, since_tick)| BannedHost {
                mac: format_mac(&mac),
                since_tick,
            })
            .collect();

        let body = serde_json::to_string(&ApiResponse::success(BannedResponse { banned }))?;
        Ok(HttpResponse::ok(body))
    }

    fn handle_unban(&self, request: &HttpRequest) -> Result<HttpResponse, anyhow::Error> {
        let Some(body) = request.body.as_deref() else {
            return Ok(HttpResponse::error(400, "Missing request body".to_string()));
        };

        let json: Value = match serde_json::from_str(body) {
            Ok(json) => json,
            Err(e) => return Ok(HttpResponse::error(400, format!("Invalid JSON body: {}", e))),
        };
        let Some(mac_str) = json["mac"].as_str() else {
            return Ok(HttpResponse::error(400, "Missing mac parameter".to_string()));
        };
        let mac = match parse_mac_address(mac_str) {
            Ok(mac) => mac,
            Err(e) => return Ok(HttpResponse::error(400, e.to_string())),
        };

        let outcome = self.scheduler.request_unban(&mac);
        let response = UnbanResponse {
            mac: format_mac(&mac),
            cancelled: outcome == UnbanOutcome::Cancelled,
        };

        let mut envelope = ApiResponse::success(response);
        if outcome == UnbanOutcome::NotBanned {
            envelope.message = Some("Host is not currently banned".to_string());
        }
        let body = serde_json::to_string(&envelope)?;
        Ok(HttpResponse::ok(body))
    }
}
