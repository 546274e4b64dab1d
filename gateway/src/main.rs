use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware;
use axum::response::Response;
use axum::routing::{any, get, post};
use axum::Router;
use common_auth::HttpTokenValidator;
use common_http_errors::exception_mapper_layer;
use common_security::{PolicyTable, Role};
use reqwest::Client;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use gateway::app_state::AppState;
use gateway::authn::authn_middleware;
use gateway::authz::authz_middleware;
use gateway::cache::ResponseCache;
use gateway::circuit_breaker::{CircuitBreaker, CircuitConfig};
use gateway::config::GatewayConfig;
use gateway::handlers;
use gateway::kv::{KVStore, RedisStore};
use gateway::metrics::GatewayMetrics;
use gateway::pipeline::{correlation_id_layer, rate_limit_middleware};
use gateway::rate_limiter::RateLimiter;
use gateway::uploads::UploadSpool;

/// The policy table this gateway ships with (spec §4.2). `admin` bypasses
/// this entirely; everything below is reachable only by `user`.
fn policy_table() -> PolicyTable {
    PolicyTable::new()
        .allow("service-a.items", "read", vec![Role::new(Role::USER)])
        .allow("service-a.items", "write", vec![Role::new(Role::USER)])
        .allow("service-a.categories", "read", vec![Role::new(Role::USER)])
        .allow("service-a.statistics", "read", vec![Role::new(Role::USER)])
        .allow("service-b.reports", "read", vec![Role::new(Role::USER)])
        .allow("service-b.notifications", "write", vec![Role::new(Role::USER)])
        .allow("service-c.files", "write", vec![Role::new(Role::USER)])
        .allow("service-c.folders", "write", vec![Role::new(Role::USER)])
        .allow("system", "read", vec![Role::new(Role::USER)])
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(response) => response,
        Err(err) => {
            warn!(?err, "failed to render metrics");
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(axum::body::Body::from("metrics unavailable"))
                .expect("failed to build metrics error response")
        }
    }
}

fn build_cors_layer() -> CorsLayer {
    let configured = std::env::var("CORS_ALLOWED_ORIGINS").ok();

    let origin = match configured {
        Some(raw) => {
            let origins: Vec<HeaderValue> = raw
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .filter_map(|o| o.parse::<HeaderValue>().ok())
                .collect();
            AllowOrigin::list(origins)
        }
        None => {
            warn!("CORS_ALLOWED_ORIGINS not set; allowing any origin, unsuitable for production");
            AllowOrigin::any()
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = Arc::new(GatewayConfig::from_env()?);

    let kv: Arc<dyn KVStore> = Arc::new(
        RedisStore::connect(&config.redis_url())
            .await
            .context("failed to connect to Redis")?,
    );

    let rate_limiter = RateLimiter::new(kv.clone(), config.throttle_limit, config.throttle_ttl_secs);
    let circuit_breaker = Arc::new(CircuitBreaker::new(CircuitConfig {
        failure_threshold: config.breaker_failure_threshold,
        reset_timeout: config.breaker_reset_timeout,
        half_open_attempts: config.breaker_half_open_attempts,
    }));
    let cache = ResponseCache::new(kv.clone(), config.cache_default_ttl);
    let token_validator = Arc::new(
        HttpTokenValidator::new(config.auth_service_url.clone(), config.request_timeout)
            .context("failed to build token validator HTTP client")?,
    );
    let policy = Arc::new(policy_table());
    let http_client = Client::builder().timeout(config.request_timeout).build().context("failed to build HTTP client")?;
    let metrics = Arc::new(GatewayMetrics::new()?);
    let uploads = UploadSpool::new(config.upload_dir.clone(), config.upload_max_bytes);

    let state = AppState {
        config: config.clone(),
        kv,
        rate_limiter,
        circuit_breaker,
        cache,
        token_validator,
        policy,
        http_client,
        metrics,
        uploads,
    };

    let service_a = Router::new().route("/*rest", any(handlers::proxy)).route("/", any(handlers::proxy));
    let service_b = Router::new().route("/*rest", any(handlers::proxy)).route("/", any(handlers::proxy));
    let service_c = Router::new()
        .route("/files/:id/download", get(handlers::download_file))
        .route("/files", post(handlers::upload_file).get(handlers::proxy))
        .route("/files/*rest", any(handlers::proxy))
        .route("/folders", any(handlers::proxy))
        .route("/folders/*rest", any(handlers::proxy));

    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/system-check", get(handlers::system_check))
        .route("/system-check-key", get(handlers::system_check_key))
        .nest("/service-a", service_a)
        .nest("/service-b", service_b)
        .nest("/service-c", service_c);

    // `/metrics` sits outside the AuthN/AuthZ/RateLimiter stack entirely —
    // it's an ambient concern, not one of the spec's routed resources
    // (mirrors the teacher's `main.rs`, which mounts `/healthz`/`/metrics`
    // on the unauthenticated half of its router).
    let instrumented = Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), authz_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), authn_middleware))
        .layer(middleware::from_fn(correlation_id_layer))
        .layer(middleware::from_fn(exception_mapper_layer))
        .with_state(state.clone());

    let app = Router::new()
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(instrumented)
        .layer(build_cors_layer());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "starting gateway");
    let listener = TcpListener::bind(addr).await.context("failed to bind listener")?;

    let shutdown_drain = config.shutdown_drain;
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_drain))
        .await;

    if let Err(err) = result {
        tracing::error!(?err, "gateway server exited with an error");
        std::process::exit(1);
    }

    Ok(())
}

/// Races `Ctrl+C` against `SIGTERM`, then gives in-flight requests up to
/// `drain` to finish (spec §5's graceful-shutdown contract).
async fn shutdown_signal(drain: Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(drain_secs = drain.as_secs(), "shutdown signal received, draining in-flight requests");
    tokio::time::sleep(drain).await;
}
