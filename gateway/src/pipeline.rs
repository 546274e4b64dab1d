use axum::extract::State;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use common_security::Principal;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::context::RouteMetadata;
use crate::rate_limiter::derive_identity;
use crate::routes;

/// Correlation id for the request (§3 invariant: always present, generated
/// at ingress if the client didn't supply `X-Request-Id`). It's an opaque
/// string, not necessarily a UUID — a caller's own trace id must round-trip
/// unchanged. Inserted into request extensions for handlers/dispatcher, and
/// echoed as a response header for `exception_mapper_layer` (outermost) to
/// read back out.
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

pub async fn correlation_id_layer(mut request: Request<axum::body::Body>, next: Next) -> Response {
    let inbound = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    let correlation_id = inbound.unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(CorrelationId(correlation_id.clone()));

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let span = info_span!("request", %correlation_id, %method, %path);

    let mut response = async move {
        info!("request started");
        next.run(request).await
    }
    .instrument(span)
    .await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Final pipeline stage before the handler (spec §4.8). Writes the rate
/// limit headers regardless of outcome, and skips the check entirely for
/// public/health/`skipThrottle` routes.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let route = request.extensions().get::<RouteMetadata>().cloned().unwrap_or_default();

    if route.public || route.skip_throttle {
        return next.run(request).await;
    }

    let api_key = request.headers().get("x-api-key").and_then(|v| v.to_str().ok());
    let principal = request.extensions().get::<Principal>();
    let remote_ip = request.headers().get("x-forwarded-for").and_then(|v| v.to_str().ok());
    let identity = derive_identity(api_key, principal.map(|p| p.id.as_str()), remote_ip);

    let method = request.method().to_string();
    let decision = state.rate_limiter.check(&identity, &method, route.resource).await;
    state.metrics.record_rate_check(&identity, decision.limited);

    let mut tenant_decision = None;
    if state.config.enable_tenant_rate_limits {
        if let Some(resource) = route.resource {
            if routes::is_tenant_scoped(resource) {
                if let Some(principal) = principal {
                    let tenant_identity = format!("tenant:{}", principal.tenant_id);
                    tenant_decision = Some(state.rate_limiter.check(&tenant_identity, &method, Some(resource)).await);
                }
            }
        }
    }

    if decision.limited {
        let mut response = common_http_errors::ApiError::rate_limited().into_response();
        apply_rate_limit_headers(&mut response, &decision, tenant_decision.as_ref());
        return response;
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(&mut response, &decision, tenant_decision.as_ref());
    response
}

fn apply_rate_limit_headers(
    response: &mut Response,
    decision: &crate::rate_limiter::RateDecision,
    tenant_decision: Option<&crate::rate_limiter::RateDecision>,
) {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_epoch_secs));

    if let Some(tenant_decision) = tenant_decision {
        headers.insert("x-tenant-ratelimit-limit", HeaderValue::from(tenant_decision.limit));
        headers.insert("x-tenant-ratelimit-remaining", HeaderValue::from(tenant_decision.remaining));
        headers.insert("x-tenant-ratelimit-reset", HeaderValue::from(tenant_decision.reset_epoch_secs));
    }
}
