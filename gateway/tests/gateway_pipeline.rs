use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware;
use axum::routing::{any, get, post};
use axum::Router;
use common_auth::{TokenValidator, TokenValidatorError, UserData};
use common_security::{PolicyTable, Role};
use gateway::authn::authn_middleware;
use gateway::authz::authz_middleware;
use gateway::cache::ResponseCache;
use gateway::circuit_breaker::{CircuitBreaker, CircuitConfig};
use gateway::config::GatewayConfig;
use gateway::kv::{InMemoryStore, KVStore};
use gateway::metrics::GatewayMetrics;
use gateway::pipeline::{correlation_id_layer, rate_limit_middleware};
use gateway::rate_limiter::RateLimiter;
use gateway::uploads::UploadSpool;
use gateway::{handlers, AppState};
use httpmock::prelude::*;
use serde_json::json;
use tower::ServiceExt;

struct RejectingValidator;

#[async_trait::async_trait]
impl TokenValidator for RejectingValidator {
    async fn validate(&self, _token: &str) -> Result<UserData, TokenValidatorError> {
        Err(TokenValidatorError::Rejected)
    }
}

fn test_config(service_a_url: String) -> GatewayConfig {
    GatewayConfig {
        port: 0,
        redis_host_master: "127.0.0.1".to_string(),
        redis_port: 6379,
        throttle_ttl_secs: 60,
        throttle_limit: 60,
        enable_tenant_rate_limits: false,
        auth_service_url: "http://auth.local".to_string(),
        static_api_tokens: vec!["test-key".to_string()],
        service_a_url,
        service_a_api_key: "key-a".to_string(),
        service_b_url: "http://b.local".to_string(),
        service_b_api_key: "key-b".to_string(),
        service_c_url: "http://c.local".to_string(),
        service_c_api_key: "key-c".to_string(),
        shutdown_drain: Duration::from_secs(1),
        breaker_failure_threshold: 2,
        breaker_reset_timeout: Duration::from_millis(50),
        breaker_half_open_attempts: 1,
        cache_default_ttl: Duration::from_secs(300),
        upload_max_bytes: 1_048_576,
        upload_dir: std::env::temp_dir().to_string_lossy().to_string(),
        request_timeout: Duration::from_secs(5),
    }
}

fn test_state(config: GatewayConfig) -> AppState {
    let kv: Arc<dyn KVStore> = Arc::new(InMemoryStore::new());
    let rate_limiter = RateLimiter::new(kv.clone(), config.throttle_limit, config.throttle_ttl_secs);
    let circuit_breaker = Arc::new(CircuitBreaker::new(CircuitConfig {
        failure_threshold: config.breaker_failure_threshold,
        reset_timeout: config.breaker_reset_timeout,
        half_open_attempts: config.breaker_half_open_attempts,
    }));
    let cache = ResponseCache::new(kv.clone(), config.cache_default_ttl);
    let token_validator: Arc<dyn TokenValidator> = Arc::new(RejectingValidator);
    let policy = Arc::new(
        PolicyTable::new()
            .allow("service-a.items", "read", vec![Role::new(Role::USER)])
            .allow("service-a.items", "write", vec![Role::new(Role::USER)]),
    );
    let http_client = reqwest::Client::builder().timeout(config.request_timeout).build().unwrap();
    let metrics = Arc::new(GatewayMetrics::new().unwrap());
    let uploads = UploadSpool::new(config.upload_dir.clone(), config.upload_max_bytes);

    AppState {
        config: Arc::new(config),
        kv,
        rate_limiter,
        circuit_breaker,
        cache,
        token_validator,
        policy,
        http_client,
        metrics,
        uploads,
    }
}

/// Mirrors `main.rs`'s "instrumented" router assembly (the five ordered
/// pipeline stages in front of the nested `/api` tree), minus `/metrics`
/// and CORS, neither of which the pipeline stages under test touch.
fn test_app(state: AppState) -> Router {
    let service_a = Router::new().route("/*rest", any(handlers::proxy)).route("/", any(handlers::proxy));
    let service_c = Router::new()
        .route("/files/:id/download", get(handlers::download_file))
        .route("/files", post(handlers::upload_file).get(handlers::proxy))
        .route("/files/*rest", any(handlers::proxy));

    let api = Router::new()
        .route("/system-check", get(handlers::system_check))
        .route("/system-check-key", get(handlers::system_check_key))
        .nest("/service-a", service_a)
        .nest("/service-c", service_c);

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), authz_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), authn_middleware))
        .layer(middleware::from_fn(correlation_id_layer))
        .layer(middleware::from_fn(common_http_errors::exception_mapper_layer))
        .with_state(state)
}

fn authed_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-api-key", "test-key")
        .header("x-tenant-id", "11111111-1111-1111-1111-111111111111")
        .header("x-user-role", "user")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn happy_path_proxies_and_normalizes_the_envelope() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/items/42");
        then.status(200).json_body(json!({"id": "42", "name": "widget"}));
    });

    let state = test_state(test_config(server.base_url()));
    let app = test_app(state);

    let response = app.oneshot(authed_request("/api/service-a/items/42")).await.unwrap();
    mock.assert();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["name"], "widget");
}

#[tokio::test]
async fn missing_credentials_are_rejected() {
    let server = MockServer::start();
    let state = test_state(test_config(server.base_url()));
    let app = test_app(state);

    let request = Request::builder().uri("/api/service-a/items/42").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn rate_limit_blocks_the_second_call_within_the_window() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/items/42");
        then.status(200).json_body(json!({"id": "42"}));
    });

    let mut config = test_config(server.base_url());
    config.throttle_limit = 1;
    let state = test_state(config);
    let app = test_app(state);

    let first = app.clone().oneshot(authed_request("/api/service-a/items/42")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(authed_request("/api/service-a/items/42")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.headers().get("x-ratelimit-remaining").unwrap(), "0");
}

#[tokio::test]
async fn repeated_upstream_failures_trip_the_breaker_and_later_calls_short_circuit() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/items/42");
        then.status(500);
    });

    let state = test_state(test_config(server.base_url()));
    let app = test_app(state);

    for _ in 0..2 {
        let response = app.clone().oneshot(authed_request("/api/service-a/items/42")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
    mock.assert_hits(2);

    let tripped = app.oneshot(authed_request("/api/service-a/items/42")).await.unwrap();
    assert_eq!(tripped.status(), StatusCode::SERVICE_UNAVAILABLE);
    // breaker rejected before a third upstream call was made
    mock.assert_hits(2);
}

#[tokio::test]
async fn delete_returns_204_then_404_not_204_twice() {
    let server = MockServer::start();
    let first_mock = server.mock(|when, then| {
        when.method(DELETE).path("/items/42").header("x-call", "first");
        then.status(204);
    });
    let second_mock = server.mock(|when, then| {
        when.method(DELETE).path("/items/42").header("x-call", "second");
        then.status(404);
    });

    let state = test_state(test_config(server.base_url()));
    let app = test_app(state);

    let mut first_request = authed_request("/api/service-a/items/42");
    *first_request.method_mut() = axum::http::Method::DELETE;
    first_request.headers_mut().insert("x-call", axum::http::HeaderValue::from_static("first"));
    let first = app.clone().oneshot(first_request).await.unwrap();
    first_mock.assert();
    assert_eq!(first.status(), StatusCode::NO_CONTENT);
    let first_bytes = axum::body::to_bytes(first.into_body(), 1024).await.unwrap();
    assert!(first_bytes.is_empty());

    let mut second_request = authed_request("/api/service-a/items/42");
    *second_request.method_mut() = axum::http::Method::DELETE;
    second_request.headers_mut().insert("x-call", axum::http::HeaderValue::from_static("second"));
    let second = app.oneshot(second_request).await.unwrap();
    second_mock.assert();
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upstream_not_found_is_translated_into_the_gateway_envelope() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/items/missing");
        then.status(404);
    });

    let state = test_state(test_config(server.base_url()));
    let app = test_app(state);

    let response = app.oneshot(authed_request("/api/service-a/items/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers().get("X-Error-Code").unwrap(), "ERR_RESOURCE_NOT_FOUND");

    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "NotFound");
}
