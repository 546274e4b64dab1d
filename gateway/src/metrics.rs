use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    rate_checks: IntCounterVec,
    rate_rejections: IntCounterVec,
    breaker_state: IntGaugeVec,
    cache_hits: IntCounterVec,
    cache_misses: IntCounterVec,
    dispatch_latency: Histogram,
    dispatch_errors: IntCounterVec,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let rate_checks = IntCounterVec::new(
            Opts::new("gateway_rate_limit_checks_total", "Total rate limit checks"),
            &["identity"],
        )?;
        let rate_rejections = IntCounterVec::new(
            Opts::new("gateway_rate_limit_rejections_total", "Total rate limit rejections"),
            &["identity"],
        )?;
        let breaker_state = IntGaugeVec::new(
            Opts::new("gateway_circuit_breaker_state", "Circuit breaker state per upstream (0=closed,1=half-open,2=open)"),
            &["upstream"],
        )?;
        let cache_hits = IntCounterVec::new(
            Opts::new("gateway_cache_hits_total", "Response cache hits"),
            &["upstream"],
        )?;
        let cache_misses = IntCounterVec::new(
            Opts::new("gateway_cache_misses_total", "Response cache misses"),
            &["upstream"],
        )?;
        let dispatch_latency = Histogram::with_opts(HistogramOpts::new(
            "gateway_dispatch_latency_seconds",
            "Time spent dispatching a request to an upstream",
        ))?;
        let dispatch_errors = IntCounterVec::new(
            Opts::new("gateway_dispatch_errors_total", "Dispatch errors per upstream and kind"),
            &["upstream", "kind"],
        )?;

        registry.register(Box::new(rate_checks.clone()))?;
        registry.register(Box::new(rate_rejections.clone()))?;
        registry.register(Box::new(breaker_state.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(dispatch_latency.clone()))?;
        registry.register(Box::new(dispatch_errors.clone()))?;

        Ok(Self {
            registry,
            rate_checks,
            rate_rejections,
            breaker_state,
            cache_hits,
            cache_misses,
            dispatch_latency,
            dispatch_errors,
        })
    }

    pub fn record_rate_check(&self, identity: &str, limited: bool) {
        self.rate_checks.with_label_values(&[identity]).inc();
        if limited {
            self.rate_rejections.with_label_values(&[identity]).inc();
        }
    }

    pub fn set_breaker_state(&self, upstream: &str, state_code: i64) {
        self.breaker_state.with_label_values(&[upstream]).set(state_code);
    }

    pub fn record_cache(&self, upstream: &str, hit: bool) {
        if hit {
            self.cache_hits.with_label_values(&[upstream]).inc();
        } else {
            self.cache_misses.with_label_values(&[upstream]).inc();
        }
    }

    pub fn observe_dispatch_latency(&self, secs: f64) {
        self.dispatch_latency.observe(secs);
    }

    pub fn record_dispatch_error(&self, upstream: &str, kind: &str) {
        self.dispatch_errors.with_label_values(&[upstream, kind]).inc();
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"))
            .body(Body::from(buffer))?;
        Ok(response)
    }
}
