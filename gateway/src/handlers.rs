use axum::body::Body;
use axum::extract::{Multipart, Path, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use common_http_errors::{redact_json, ApiError, FieldError};
use common_security::Principal;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::config::GatewayConfig;
use crate::dispatcher::{self, UpstreamCall};
use crate::pipeline::CorrelationId;

pub async fn health() -> impl IntoResponse {
    Json(json!({"success": true, "data": {"status": "ok"}}))
}

pub async fn system_check() -> impl IntoResponse {
    Json(json!({"success": true, "data": {"status": "ok"}}))
}

pub async fn system_check_key(principal: axum::Extension<Principal>) -> impl IntoResponse {
    let principal = principal.0;
    Json(json!({
        "success": true,
        "data": {
            "principalId": principal.id,
            "tenantId": principal.tenant_id,
            "roles": principal.roles.iter().map(|r| r.as_str().to_string()).collect::<Vec<_>>(),
        }
    }))
}

/// Maps a gateway path under `/api/<family>/...` to its upstream, stripping
/// the family segment so the remainder mirrors the upstream path one-for-one
/// (spec §6).
fn resolve_upstream<'a>(
    config: &'a GatewayConfig,
    path: &str,
) -> Result<(&'static str, &'a str, &'a str, String), ApiError> {
    let rest = path.strip_prefix("/api/").unwrap_or(path);
    let mut segments = rest.splitn(2, '/');
    let family = segments.next().unwrap_or("");
    let upstream_path = segments.next().map(|p| format!("/{p}")).unwrap_or_default();

    match family {
        "service-a" => Ok(("service-a", &config.service_a_url, &config.service_a_api_key, upstream_path)),
        "service-b" => Ok(("service-b", &config.service_b_url, &config.service_b_api_key, upstream_path)),
        "service-c" => Ok(("service-c", &config.service_c_url, &config.service_c_api_key, upstream_path)),
        _ => Err(ApiError::not_found("route", path)),
    }
}

const FORWARDED_HEADERS: &[&str] =
    &["x-user-email", "x-user-role", "x-tenant-name", "x-accept-language", "x-forwarded-for"];

fn forward_identity_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    FORWARDED_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()).map(|v| (name.to_string(), v.to_string())))
        .collect()
}

fn parse_query(query: Option<&str>) -> Vec<(String, Option<String>)> {
    let Some(query) = query else { return Vec::new() };
    match reqwest::Url::parse(&format!("http://gateway.local/?{query}")) {
        Ok(url) => url.query_pairs().map(|(k, v)| (k.to_string(), Some(v.to_string()))).collect(),
        Err(_) => Vec::new(),
    }
}

/// Generic CRUD proxy shared by all three service families (spec §6's
/// "exact paths mirror upstream paths one-for-one"). Resource-level AuthZ
/// has already run in `authz_middleware` by the time this is reached.
pub async fn proxy(State(state): State<AppState>, request: Request<Body>) -> Result<Response, ApiError> {
    let principal = request
        .extensions()
        .get::<Principal>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("missing principal"))?;
    let correlation_id =
        request.extensions().get::<CorrelationId>().map(|c| c.0.clone()).unwrap_or_else(|| Uuid::new_v4().to_string());

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);
    let headers = request.headers().clone();

    let (upstream, base_url, api_key, upstream_path) = resolve_upstream(&state.config, &path)?;

    let body_bytes = axum::body::to_bytes(request.into_body(), state.config.upload_max_bytes as usize)
        .await
        .map_err(|_| ApiError::bad_request("ERR_INVALID_BODY", "failed to read request body"))?;

    let body = if body_bytes.is_empty() {
        None
    } else {
        let value: serde_json::Value = serde_json::from_slice(&body_bytes).map_err(|err| {
            ApiError::validation(vec![FieldError { field: "body".to_string(), message: err.to_string() }])
        })?;
        let mut loggable = value.clone();
        redact_json(&mut loggable);
        debug!(%path, body = %loggable, "forwarding request body upstream");
        Some(value)
    };

    let mut call = UpstreamCall::get(upstream, base_url, api_key, &upstream_path, &correlation_id)
        .with_method(method.clone())
        .with_query(parse_query(query.as_deref()), principal.tenant_id)
        .with_forwarded_headers(forward_identity_headers(&headers));
    if let Some(body) = body {
        call = call.with_body(body);
    }

    let tenant = principal.tenant_id.to_string();
    let cache_key = crate::cache::cache_key(upstream, &tenant, &upstream_path, &[query.as_deref().unwrap_or("")]);

    // Opt-in read-through cache for idempotent GETs (spec §4.5); every other
    // verb invalidates the exact key it would have populated.
    if method == Method::GET {
        if let Some(cached) = state.cache.get(&cache_key).await {
            state.metrics.record_cache(upstream, true);
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&cached) {
                return Ok(Json(value).into_response());
            }
        }
        state.metrics.record_cache(upstream, false);

        let outcome = dispatcher::dispatch(&state, call, principal.tenant_id).await?;
        if let Some(data) = &outcome.body {
            if let Ok(bytes) = serde_json::to_vec(data) {
                state.cache.put(&cache_key, bytes, Some(state.config.cache_default_ttl)).await;
            }
        }
        return Ok(dispatch_response(outcome));
    }

    let outcome = dispatcher::dispatch(&state, call, principal.tenant_id).await?;
    state.cache.invalidate(&[cache_key]).await;
    Ok(dispatch_response(outcome))
}

/// Builds the client-facing response from an upstream outcome, preserving
/// the real status instead of always answering 200 (spec §8: two DELETEs of
/// the same id must return 204 then 404, never 204 twice).
fn dispatch_response(outcome: dispatcher::DispatchOutcome) -> Response {
    match outcome.body {
        Some(data) => (outcome.status, Json(data)).into_response(),
        None => outcome.status.into_response(),
    }
}

/// `POST /api/service-c/files`: spools the upload locally (validating size
/// and extension), forwards it to the upstream as multipart, then always
/// removes the spool copy regardless of outcome.
pub async fn upload_file(
    State(state): State<AppState>,
    principal: axum::Extension<Principal>,
    correlation: axum::Extension<CorrelationId>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let principal = principal.0;
    let request_id = correlation.0 .0.to_string();

    let mut filename = None;
    let mut bytes = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request("ERR_INVALID_UPLOAD", err.to_string()))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().map(str::to_string);
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::bad_request("ERR_INVALID_UPLOAD", err.to_string()))?
                    .to_vec(),
            );
        }
    }

    let filename = filename.ok_or_else(|| ApiError::bad_request("ERR_MISSING_FILE", "no file field in upload"))?;
    let bytes = bytes.ok_or_else(|| ApiError::bad_request("ERR_MISSING_FILE", "no file field in upload"))?;

    let spooled = state.uploads.spool(principal.tenant_id, &filename, &bytes).await?;

    let call = UpstreamCall::get(
        "service-c",
        &state.config.service_c_url,
        &state.config.service_c_api_key,
        "/files",
        &request_id,
    )
    .with_method(Method::POST)
    .with_query(Vec::new(), principal.tenant_id);

    let result = dispatcher::dispatch_multipart(&state, call, filename, bytes, principal.tenant_id).await;
    state.uploads.cleanup(&spooled).await;
    Ok(dispatch_response(result?))
}

/// `GET /api/service-c/files/:id/download`: one metadata call for the
/// filename, then a second call whose body is streamed back verbatim
/// (spec §4.6).
pub async fn download_file(
    State(state): State<AppState>,
    principal: axum::Extension<Principal>,
    correlation: axum::Extension<CorrelationId>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let principal = principal.0;
    let request_id = correlation.0 .0.to_string();

    let meta_call = UpstreamCall::get(
        "service-c",
        &state.config.service_c_url,
        &state.config.service_c_api_key,
        &format!("/files/{id}"),
        &request_id,
    )
    .with_query(Vec::new(), principal.tenant_id);
    let metadata = dispatcher::dispatch(&state, meta_call, principal.tenant_id).await?;
    let filename = metadata
        .body
        .as_ref()
        .and_then(|d| d.get("data"))
        .and_then(|d| d.get("filename"))
        .and_then(|v| v.as_str())
        .unwrap_or("download")
        .to_string();

    let stream_call = UpstreamCall::get(
        "service-c",
        &state.config.service_c_url,
        &state.config.service_c_api_key,
        &format!("/files/{id}/download"),
        &request_id,
    )
    .with_query(Vec::new(), principal.tenant_id);
    let streamed = dispatcher::dispatch_stream(&state, stream_call, principal.tenant_id).await?;

    let content_type = streamed.content_type.unwrap_or_else(|| "application/octet-stream".to_string());
    let body = Body::from_stream(streamed.response.bytes_stream());

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, HeaderValue::from_str(&content_type).unwrap_or(HeaderValue::from_static("application/octet-stream")))
        .header(
            axum::http::header::CONTENT_DISPOSITION,
            HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
                .unwrap_or(HeaderValue::from_static("attachment")),
        )
        .body(body)
        .map_err(|err| ApiError::internal(format!("failed to build download response: {err}")))?;

    if let Some(len) = streamed.content_length {
        response.headers_mut().insert(axum::http::header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GatewayConfig {
        GatewayConfig {
            port: 8000,
            redis_host_master: "127.0.0.1".to_string(),
            redis_port: 6379,
            throttle_ttl_secs: 60,
            throttle_limit: 60,
            enable_tenant_rate_limits: false,
            auth_service_url: "http://auth.local".to_string(),
            static_api_tokens: Vec::new(),
            service_a_url: "http://a.local".to_string(),
            service_a_api_key: "key-a".to_string(),
            service_b_url: "http://b.local".to_string(),
            service_b_api_key: "key-b".to_string(),
            service_c_url: "http://c.local".to_string(),
            service_c_api_key: "key-c".to_string(),
            shutdown_drain: std::time::Duration::from_secs(30),
            breaker_failure_threshold: 3,
            breaker_reset_timeout: std::time::Duration::from_secs(30),
            breaker_half_open_attempts: 2,
            cache_default_ttl: std::time::Duration::from_secs(300),
            upload_max_bytes: 10_485_760,
            upload_dir: "./uploads".to_string(),
            request_timeout: std::time::Duration::from_secs(30),
        }
    }

    #[test]
    fn resolves_each_family_and_strips_its_prefix() {
        let config = config();
        let (upstream, base_url, _, path) = resolve_upstream(&config, "/api/service-a/items/42").unwrap();
        assert_eq!(upstream, "service-a");
        assert_eq!(base_url, "http://a.local");
        assert_eq!(path, "/items/42");
    }

    #[test]
    fn unknown_family_is_not_found() {
        let config = config();
        assert!(resolve_upstream(&config, "/api/unknown/items").is_err());
    }

    #[test]
    fn query_parsing_pairs_up_keys_and_values() {
        let pairs = parse_query(Some("page=2&limit=5"));
        assert_eq!(pairs, vec![("page".to_string(), Some("2".to_string())), ("limit".to_string(), Some("5".to_string()))]);
        assert_eq!(parse_query(None), Vec::new());
    }
}
