// src/admin.rs
//! Gate for the admin-only endpoints: a client-IP allow-list plus a
//! once-per-day limit on the manual trigger. Raw client IPs never reach the
//! logs, only short hashes.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use metrics::counter;
use tracing::{debug, warn};

/// Manual trigger allowance per client IP.
const TRIGGER_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminDecision {
    Allowed,
    /// Client IP is not on the allow-list.
    Forbidden,
    /// Allow-listed, but this IP already triggered within the window.
    RateLimited { retry_after_secs: u64 },
}

#[derive(Debug)]
pub struct AdminGate {
    allowed_ips: Vec<String>,
    recent_triggers: Mutex<HashMap<String, Instant>>,
}

impl AdminGate {
    pub fn new(allowed_ips: Vec<String>) -> Self {
        Self {
            allowed_ips: allowed_ips.iter().map(|ip| canonical_ip(ip)).collect(),
            recent_triggers: Mutex::new(HashMap::new()),
        }
    }

    /// Allow-list check alone, used by read-only admin endpoints.
    pub fn check_ip(&self, ip: &str) -> bool {
        let allowed = self.allowed_ips.contains(&canonical_ip(ip));
        if !allowed {
            counter!("admin_denied_total").increment(1);
            warn!(client = %anon_hash(ip), "admin endpoint denied");
        }
        allowed
    }

    /// Allow-list plus rate limit for the manual trigger. A granted check
    /// consumes this IP's daily allowance.
    pub fn check_trigger(&self, ip: &str) -> AdminDecision {
        let canonical = canonical_ip(ip);
        if !self.allowed_ips.contains(&canonical) {
            counter!("admin_denied_total").increment(1);
            warn!(client = %anon_hash(ip), "manual trigger denied");
            return AdminDecision::Forbidden;
        }

        let key = anon_hash(&canonical);
        let now = Instant::now();
        let mut recent = self
            .recent_triggers
            .lock()
            .expect("admin gate mutex poisoned");
        recent.retain(|_, at| now.duration_since(*at) < TRIGGER_WINDOW);
        if let Some(last) = recent.get(&key) {
            let remaining = TRIGGER_WINDOW - now.duration_since(*last);
            debug!(client = %key, remaining_secs = remaining.as_secs(), "manual trigger rate limited");
            return AdminDecision::RateLimited {
                retry_after_secs: remaining.as_secs(),
            };
        }
        recent.insert(key, now);
        AdminDecision::Allowed
    }

    /// Hand back an allowance when the trigger it paid for was refused
    /// downstream (a run was already in progress).
    pub fn refund_trigger(&self, ip: &str) {
        let key = anon_hash(&canonical_ip(ip));
        self.recent_triggers
            .lock()
            .expect("admin gate mutex poisoned")
            .remove(&key);
    }
}

/// Fold IPv6-mapped IPv4 addresses back to dotted form so a dual-stack
/// listener matches a v4 allow-list.
fn canonical_ip(ip: &str) -> String {
    match ip.trim().parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        Ok(v4) => v4.to_string(),
        Err(_) => ip.trim().to_string(),
    }
}

/// Short stable hash for log lines. Never log the raw value.
pub fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AdminGate {
        AdminGate::new(vec!["127.0.0.1".to_string(), "10.0.0.7".to_string()])
    }

    #[test]
    fn unknown_ip_is_forbidden() {
        let g = gate();
        assert!(!g.check_ip("192.168.1.50"));
        assert_eq!(g.check_trigger("192.168.1.50"), AdminDecision::Forbidden);
    }

    #[test]
    fn mapped_v6_loopback_matches_v4_entry() {
        let g = gate();
        assert!(g.check_ip("::ffff:127.0.0.1"));
    }

    #[test]
    fn read_checks_do_not_consume_the_allowance() {
        let g = gate();
        assert!(g.check_ip("127.0.0.1"));
        assert!(g.check_ip("127.0.0.1"));
        assert_eq!(g.check_trigger("127.0.0.1"), AdminDecision::Allowed);
    }

    #[test]
    fn second_trigger_within_window_is_limited() {
        let g = gate();
        assert_eq!(g.check_trigger("10.0.0.7"), AdminDecision::Allowed);
        match g.check_trigger("10.0.0.7") {
            AdminDecision::RateLimited { retry_after_secs } => {
                assert!(retry_after_secs <= TRIGGER_WINDOW.as_secs());
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
        // a different allow-listed IP still has its allowance
        assert_eq!(g.check_trigger("127.0.0.1"), AdminDecision::Allowed);
    }

    #[test]
    fn refund_restores_the_allowance() {
        let g = gate();
        assert_eq!(g.check_trigger("10.0.0.7"), AdminDecision::Allowed);
        assert!(matches!(
            g.check_trigger("10.0.0.7"),
            AdminDecision::RateLimited { .. }
        ));
        g.refund_trigger("10.0.0.7");
        assert_eq!(g.check_trigger("10.0.0.7"), AdminDecision::Allowed);
    }

    #[test]
    fn expired_entry_allows_again() {
        let g = gate();
        assert_eq!(g.check_trigger("10.0.0.7"), AdminDecision::Allowed);
        // backdate the recorded trigger past the window; skip on hosts whose
        // monotonic clock is younger than that
        let Some(old) = Instant::now().checked_sub(TRIGGER_WINDOW + Duration::from_secs(60))
        else {
            return;
        };
        {
            let mut recent = g.recent_triggers.lock().unwrap();
            let key = anon_hash(&canonical_ip("10.0.0.7"));
            recent.insert(key, old);
        }
        assert_eq!(g.check_trigger("10.0.0.7"), AdminDecision::Allowed);
    }

    #[test]
    fn anon_hash_is_short_and_stable() {
        let a = anon_hash("10.0.0.7");
        let b = anon_hash("10.0.0.7");
        let c = anon_hash("10.0.0.8");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 12);
        assert!(a.bytes().all(|ch| ch.is_ascii_hexdigit()));
    }
}
