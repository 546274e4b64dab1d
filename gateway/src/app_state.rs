use std::sync::Arc;

use common_auth::TokenValidator;
use common_security::PolicyTable;
use reqwest::Client;

use crate::cache::ResponseCache;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::GatewayConfig;
use crate::kv::KVStore;
use crate::metrics::GatewayMetrics;
use crate::rate_limiter::RateLimiter;
use crate::uploads::UploadSpool;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub kv: Arc<dyn KVStore>,
    pub rate_limiter: RateLimiter,
    pub circuit_breaker: Arc<CircuitBreaker>,
    pub cache: ResponseCache,
    pub token_validator: Arc<dyn TokenValidator>,
    pub policy: Arc<PolicyTable>,
    pub http_client: Client,
    pub metrics: Arc<GatewayMetrics>,
    pub uploads: UploadSpool,
}
