use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::kv::KVStore;

#[derive(Debug, Clone, Copy)]
pub struct RateRule {
    pub limit: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub limited: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_epoch_secs: u64,
    pub current: i64,
}

/// `(method, resource) -> rule`, falling back to `(method)` then the
/// process-wide default (spec §4.3's rule-resolution order).
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KVStore>,
    by_method_resource: Vec<((String, String), RateRule)>,
    by_method: Vec<(String, RateRule)>,
    default_rule: RateRule,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KVStore>, default_limit: u32, default_window_secs: u64) -> Self {
        Self {
            store,
            by_method_resource: Vec::new(),
            by_method: Vec::new(),
            default_rule: RateRule { limit: default_limit, window_secs: default_window_secs.max(1) },
        }
    }

    pub fn with_method_resource_rule(mut self, method: &str, resource: &str, rule: RateRule) -> Self {
        self.by_method_resource.push(((method.to_ascii_uppercase(), resource.to_string()), rule));
        self
    }

    pub fn with_method_rule(mut self, method: &str, rule: RateRule) -> Self {
        self.by_method.push((method.to_ascii_uppercase(), rule));
        self
    }

    fn rule_for(&self, method: &str, resource: Option<&str>) -> RateRule {
        let method = method.to_ascii_uppercase();
        if let Some(resource) = resource {
            if let Some((_, rule)) = self
                .by_method_resource
                .iter()
                .find(|((m, r), _)| m == &method && r == resource)
            {
                return *rule;
            }
        }
        if let Some((_, rule)) = self.by_method.iter().find(|(m, _)| m == &method) {
            return *rule;
        }
        self.default_rule
    }

    /// Fixed-window check against the shared KV. Fails open on any KV
    /// error, per spec §4.3.
    pub async fn check(&self, identity: &str, method: &str, resource: Option<&str>) -> RateDecision {
        let rule = self.rule_for(method, resource);
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let window_index = now / rule.window_secs;
        let key = format!("ratelimit:{identity}:{method}:{}:{window_index}", resource.unwrap_or("-"));
        let reset_epoch_secs = (window_index + 1) * rule.window_secs;

        match self.store.incr(&key, Duration::from_secs(rule.window_secs)).await {
            Ok(current) => {
                let limited = current > rule.limit as i64;
                let remaining = (rule.limit as i64 - current).max(0) as u32;
                RateDecision { limited, limit: rule.limit, remaining, reset_epoch_secs, current }
            }
            Err(err) => {
                warn!(?err, identity, "rate limiter KV failure, failing open");
                RateDecision { limited: false, limit: rule.limit, remaining: rule.limit, reset_epoch_secs, current: 0 }
            }
        }
    }
}

/// Derives the rate-limit identity per spec §4.3 and normalizes it:
/// collapse `:` runs, strip leading/trailing `:`, drop a bare `ffff` token
/// left behind by IPv4-mapped IPv6 addresses.
pub fn derive_identity(api_key: Option<&str>, principal_id: Option<&str>, remote_ip: Option<&str>) -> String {
    let raw = if let Some(key) = api_key {
        format!("api-key:{key}:{}", principal_id.or(remote_ip).unwrap_or("anonymous"))
    } else if let Some(id) = principal_id {
        id.to_string()
    } else if let Some(ip) = remote_ip {
        ip.to_string()
    } else {
        "anonymous".to_string()
    };
    normalize_identity(&raw)
}

fn normalize_identity(raw: &str) -> String {
    let collapsed: Vec<&str> = raw.split(':').filter(|segment| !segment.is_empty() && *segment != "ffff").collect();
    if collapsed.is_empty() {
        "anonymous".to_string()
    } else {
        collapsed.join(":")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryStore;

    #[tokio::test]
    async fn nth_request_in_window_is_limited() {
        let limiter = RateLimiter::new(Arc::new(InMemoryStore::new()), 2, 60);
        let a = limiter.check("id1", "GET", Some("r")).await;
        let b = limiter.check("id1", "GET", Some("r")).await;
        let c = limiter.check("id1", "GET", Some("r")).await;
        assert!(!a.limited && !b.limited);
        assert!(c.limited);
        assert_eq!(c.remaining, 0);
    }

    #[tokio::test]
    async fn method_resource_rule_takes_precedence_over_method_and_default() {
        let limiter = RateLimiter::new(Arc::new(InMemoryStore::new()), 100, 60)
            .with_method_rule("GET", RateRule { limit: 10, window_secs: 60 })
            .with_method_resource_rule("GET", "hot", RateRule { limit: 1, window_secs: 60 });

        let hot = limiter.check("id1", "GET", Some("hot")).await;
        assert_eq!(hot.limit, 1);
        let other = limiter.check("id2", "GET", Some("cold")).await;
        assert_eq!(other.limit, 10);
        let no_resource = limiter.check("id3", "POST", None).await;
        assert_eq!(no_resource.limit, 100);
    }

    #[test]
    fn identity_prefers_api_key_then_principal_then_ip() {
        assert_eq!(derive_identity(Some("key1"), Some("user1"), Some("1.2.3.4")), "api-key:key1:user1");
        assert_eq!(derive_identity(None, Some("user1"), Some("1.2.3.4")), "user1");
        assert_eq!(derive_identity(None, None, Some("1.2.3.4")), "1.2.3.4");
        assert_eq!(derive_identity(None, None, None), "anonymous");
    }

    #[test]
    fn identity_normalization_strips_colons_and_ffff() {
        assert_eq!(normalize_identity("::ffff:1.2.3.4"), "1.2.3.4");
        assert_eq!(normalize_identity("a::b:"), "a:b");
    }
}
