use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub redis_host_master: String,
    pub redis_port: u16,
    pub throttle_ttl_secs: u64,
    pub throttle_limit: u32,
    pub enable_tenant_rate_limits: bool,
    pub auth_service_url: String,
    pub static_api_tokens: Vec<String>,
    pub service_a_url: String,
    pub service_a_api_key: String,
    pub service_b_url: String,
    pub service_b_api_key: String,
    pub service_c_url: String,
    pub service_c_api_key: String,
    pub shutdown_drain: Duration,
    pub breaker_failure_threshold: u32,
    pub breaker_reset_timeout: Duration,
    pub breaker_half_open_attempts: u32,
    pub cache_default_ttl: Duration,
    pub upload_max_bytes: u64,
    pub upload_dir: String,
    pub request_timeout: Duration,
}

fn optional<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|value| value.parse::<T>().ok()).unwrap_or(default)
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let auth_service_url = env::var("AUTH_SERVICE_URL").context("AUTH_SERVICE_URL must be set")?;
        let service_a_url = env::var("SERVICE_A_URL").context("SERVICE_A_URL must be set")?;
        let service_a_api_key = env::var("SERVICE_A_API_KEY").context("SERVICE_A_API_KEY must be set")?;
        let service_b_url = env::var("SERVICE_B_URL").context("SERVICE_B_URL must be set")?;
        let service_b_api_key = env::var("SERVICE_B_API_KEY").context("SERVICE_B_API_KEY must be set")?;
        let service_c_url = env::var("SERVICE_C_URL").context("SERVICE_C_URL must be set")?;
        let service_c_api_key = env::var("SERVICE_C_API_KEY").context("SERVICE_C_API_KEY must be set")?;

        let static_api_tokens = env::var("STATIC_API_TOKEN")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            port: optional("PORT", 8000),
            redis_host_master: env::var("REDIS_HOST_MASTER").unwrap_or_else(|_| "127.0.0.1".to_string()),
            redis_port: optional("REDIS_PORT", 6379),
            throttle_ttl_secs: optional::<u64>("THROTTLE_TTL", 60).max(1),
            throttle_limit: optional("THROTTLE_LIMIT", 60),
            enable_tenant_rate_limits: optional("ENABLE_TENANT_RATE_LIMITS", false),
            auth_service_url,
            static_api_tokens,
            service_a_url,
            service_a_api_key,
            service_b_url,
            service_b_api_key,
            service_c_url,
            service_c_api_key,
            shutdown_drain: Duration::from_secs(optional("SHUTDOWN_DRAIN_SECONDS", 30)),
            breaker_failure_threshold: optional("BREAKER_FAILURE_THRESHOLD", 3),
            breaker_reset_timeout: Duration::from_secs(optional("BREAKER_RESET_TIMEOUT_SECONDS", 30)),
            breaker_half_open_attempts: optional("BREAKER_HALF_OPEN_ATTEMPTS", 2),
            cache_default_ttl: Duration::from_secs(optional("CACHE_DEFAULT_TTL_SECONDS", 300)),
            upload_max_bytes: optional("UPLOAD_MAX_BYTES", 10_485_760),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            request_timeout: Duration::from_secs(optional("REQUEST_TIMEOUT_SECONDS", 30)),
        })
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.redis_host_master, self.redis_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn set_required_vars() {
        env::set_var("AUTH_SERVICE_URL", "http://auth.local");
        env::set_var("SERVICE_A_URL", "http://a.local");
        env::set_var("SERVICE_A_API_KEY", "key-a");
        env::set_var("SERVICE_B_URL", "http://b.local");
        env::set_var("SERVICE_B_API_KEY", "key-b");
        env::set_var("SERVICE_C_URL", "http://c.local");
        env::set_var("SERVICE_C_API_KEY", "key-c");
    }

    #[test]
    fn defaults_apply_when_optional_vars_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_required_vars();
        env::remove_var("PORT");
        env::remove_var("STATIC_API_TOKEN");

        let config = GatewayConfig::from_env().unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.throttle_limit, 60);
        assert!(config.static_api_tokens.is_empty());
    }

    #[test]
    fn static_api_token_splits_and_trims() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_required_vars();
        env::set_var("STATIC_API_TOKEN", "tok-a, tok-b ,tok-c");

        let config = GatewayConfig::from_env().unwrap();
        assert_eq!(config.static_api_tokens, vec!["tok-a", "tok-b", "tok-c"]);
    }

    #[test]
    fn missing_required_var_errors() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_required_vars();
        env::remove_var("AUTH_SERVICE_URL");
        assert!(GatewayConfig::from_env().is_err());
        env::set_var("AUTH_SERVICE_URL", "http://auth.local");
    }
}
