//! Free usage / API key gating.
//!
//! Clients without a key get `free_limit` operation requests; after that an
//! `x-api-key` header is required. Counters are in memory only and reset on
//! restart.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use crate::api::logs::log_warning;
use crate::config::Config;
use crate::error::{GateError, ServerError};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const REMAINING_HEADER: &str = "x-free-uses-remaining";

/// Outcome of a successful gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// A valid key was presented
    Keyed,
    /// Counted against the free allowance
    Free { remaining: u32 },
}

/// Per-client usage counters plus the accepted keys.
#[derive(Debug, Default)]
pub struct UsageGate {
    free_limit: u32,
    api_keys: HashSet<String>,
    counters: Mutex<HashMap<String, u32>>,
}

impl UsageGate {
    pub fn new(free_limit: u32, api_keys: HashSet<String>) -> Self {
        Self {
            free_limit,
            api_keys,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.free_limit, config.api_keys.clone())
    }

    /// Admit or refuse one request from `client`.
    pub fn check(&self, client: &str, api_key: Option<&str>) -> Result<GateDecision, GateError> {
        if let Some(key) = api_key {
            return if self.api_keys.contains(key) {
                Ok(GateDecision::Keyed)
            } else {
                Err(GateError::InvalidKey)
            };
        }

        let mut counters = self.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let used = counters.entry(client.to_string()).or_insert(0);
        if *used >= self.free_limit {
            return Err(GateError::FreeUsageExhausted { limit: self.free_limit });
        }
        *used += 1;
        Ok(GateDecision::Free {
            remaining: self.free_limit - *used,
        })
    }

    /// Free requests `client` has used so far.
    pub fn used(&self, client: &str) -> u32 {
        self.counters
            .lock()
            .map(|c| c.get(client).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

/// Identify the caller: first `x-forwarded-for` hop, else the peer address.
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware applied to the operation routes.
pub async fn gate_middleware(State(gate): State<Arc<UsageGate>>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_id(request.headers(), peer);
    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string);

    match gate.check(&client, api_key.as_deref()) {
        Ok(GateDecision::Keyed) => next.run(request).await,
        Ok(GateDecision::Free { remaining }) => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert(REMAINING_HEADER, HeaderValue::from(remaining));
            response
        }
        Err(e) => {
            log_warning(format!("Refused {}: {}", client, e));
            ServerError::from(e).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> HashSet<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_free_allowance_runs_out() {
        let gate = UsageGate::new(2, HashSet::new());

        assert_eq!(gate.check("10.0.0.1", None).unwrap(), GateDecision::Free { remaining: 1 });
        assert_eq!(gate.check("10.0.0.1", None).unwrap(), GateDecision::Free { remaining: 0 });
        assert!(matches!(
            gate.check("10.0.0.1", None),
            Err(GateError::FreeUsageExhausted { limit: 2 })
        ));
        assert_eq!(gate.used("10.0.0.1"), 2);

        // Other clients keep their own allowance
        assert_eq!(gate.check("10.0.0.2", None).unwrap(), GateDecision::Free { remaining: 1 });
    }

    #[test]
    fn test_keys_bypass_counter() {
        let gate = UsageGate::new(0, keys(&["secret"]));

        assert_eq!(gate.check("c", Some("secret")).unwrap(), GateDecision::Keyed);
        assert_eq!(gate.used("c"), 0);
        assert!(matches!(gate.check("c", Some("wrong")), Err(GateError::InvalidKey)));
        assert!(matches!(gate.check("c", None), Err(GateError::FreeUsageExhausted { .. })));
    }

    #[test]
    fn test_client_id() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "192.168.1.5:5555".parse().unwrap();

        assert_eq!(client_id(&headers, Some(peer)), "192.168.1.5");
        assert_eq!(client_id(&headers, None), "unknown");

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        assert_eq!(client_id(&headers, Some(peer)), "203.0.113.9");
    }
}
