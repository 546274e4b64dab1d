use common_http_errors::{ApiError, FieldError, SuccessEnvelope};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::circuit_breaker::Admission;

/// The upstream's real status code plus its decoded body, so a 204 (or any
/// other empty-body success, e.g. from DELETE) can be forwarded as-is
/// instead of being coerced into 200 (spec §8's DELETE-then-404 property).
pub struct DispatchOutcome {
    pub status: axum::http::StatusCode,
    pub body: Option<Value>,
}

fn to_axum_status(status: reqwest::StatusCode) -> axum::http::StatusCode {
    axum::http::StatusCode::from_u16(status.as_u16()).unwrap_or(axum::http::StatusCode::OK)
}

/// One outbound request description (spec §3's `UpstreamCall`).
pub struct UpstreamCall {
    pub upstream: &'static str,
    pub base_url: String,
    pub api_key: String,
    pub method: reqwest::Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub request_id: String,
    pub forwarded_headers: Vec<(String, String)>,
}

impl UpstreamCall {
    pub fn get(upstream: &'static str, base_url: &str, api_key: &str, path: &str, request_id: &str) -> Self {
        Self {
            upstream,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            method: reqwest::Method::GET,
            path: path.to_string(),
            query: Vec::new(),
            body: None,
            request_id: request_id.to_string(),
            forwarded_headers: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: reqwest::Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Appends `(key, value)`, dropping `undefined`/`null`; `tenantId` is
    /// always appended last (spec §4.6).
    pub fn with_query(mut self, params: Vec<(String, Option<String>)>, tenant_id: Uuid) -> Self {
        for (key, value) in params {
            if let Some(value) = value {
                self.query.push((key, value));
            }
        }
        self.query.push(("tenantId".to_string(), tenant_id.to_string()));
        self
    }

    pub fn with_forwarded_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.forwarded_headers = headers;
        self
    }
}

/// Turns a validated request into an upstream HTTP call, wrapped in the
/// circuit breaker, and normalizes the response envelope (spec §4.6).
pub async fn dispatch(state: &AppState, call: UpstreamCall, tenant_id: Uuid) -> Result<DispatchOutcome, ApiError> {
    if state.circuit_breaker.admit(call.upstream) == Admission::Reject {
        return Err(ApiError::service_unavailable(format!("{} is currently unavailable", call.upstream)));
    }

    let url = format!("{}{}", call.base_url.trim_end_matches('/'), call.path);
    let mut request = state
        .http_client
        .request(call.method.clone(), &url)
        .timeout(state.config.request_timeout)
        .header("Content-Type", "application/json")
        .header("X-Api-Key", &call.api_key)
        .header("X-Tenant-Id", tenant_id.to_string())
        .header("X-Request-Id", &call.request_id)
        .query(&call.query);

    for (name, value) in &call.forwarded_headers {
        request = request.header(name, value);
    }
    if let Some(body) = &call.body {
        request = request.json(body);
    }

    let start = std::time::Instant::now();
    let result = request.send().await;
    state.metrics.observe_dispatch_latency(start.elapsed().as_secs_f64());

    let response = match result {
        Ok(response) => response,
        Err(err) => {
            let translated = translate_transport_error(&err, call.upstream);
            if matches!(translated, ApiError::GatewayTimeout { .. } | ApiError::ServiceUnavailable { .. }) {
                state.circuit_breaker.record_failure(call.upstream);
                state.metrics.record_dispatch_error(call.upstream, translated.error_code());
            }
            return Err(translated);
        }
    };

    let status = response.status();
    if status.is_server_error() {
        state.circuit_breaker.record_failure(call.upstream);
    } else {
        state.circuit_breaker.record_success(call.upstream);
    }

    if status == reqwest::StatusCode::NOT_FOUND {
        state.metrics.record_dispatch_error(call.upstream, "ERR_RESOURCE_NOT_FOUND");
        let (resource_type, id) = infer_resource_from_path(&call.path);
        return Err(ApiError::not_found(&resource_type, &id));
    }

    if status.is_client_error() || status.is_server_error() {
        state.metrics.record_dispatch_error(call.upstream, "upstream_error");
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if looks_like_error_envelope(&body) {
            return Err(synthesize_from_envelope(status, body));
        }
        return Err(synthesize_from_status(status));
    }

    if status == reqwest::StatusCode::NO_CONTENT {
        return Ok(DispatchOutcome { status: to_axum_status(status), body: None });
    }

    let bytes = response.bytes().await.map_err(|err| ApiError::internal(format!("invalid upstream response: {err}")))?;
    if bytes.is_empty() {
        return Ok(DispatchOutcome { status: to_axum_status(status), body: None });
    }

    let body: Value = serde_json::from_slice(&bytes)
        .map_err(|err| ApiError::internal(format!("invalid upstream response: {err}")))?;

    Ok(DispatchOutcome { status: to_axum_status(status), body: Some(normalize_envelope(body)) })
}

/// A raw upstream response kept open for streaming back to the client
/// (spec §4.6 file downloads) — `dispatch` eagerly decodes JSON, which a
/// download body isn't.
pub struct StreamedUpstreamResponse {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub response: reqwest::Response,
}

/// Like `dispatch`, but leaves the response body unread for the caller to
/// stream. Shares the same admission/translation/breaker-accounting rules.
pub async fn dispatch_stream(
    state: &AppState,
    call: UpstreamCall,
    tenant_id: Uuid,
) -> Result<StreamedUpstreamResponse, ApiError> {
    if state.circuit_breaker.admit(call.upstream) == Admission::Reject {
        return Err(ApiError::service_unavailable(format!("{} is currently unavailable", call.upstream)));
    }

    let url = format!("{}{}", call.base_url.trim_end_matches('/'), call.path);
    let mut request = state
        .http_client
        .request(call.method.clone(), &url)
        .timeout(state.config.request_timeout)
        .header("X-Api-Key", &call.api_key)
        .header("X-Tenant-Id", tenant_id.to_string())
        .header("X-Request-Id", &call.request_id)
        .query(&call.query);

    for (name, value) in &call.forwarded_headers {
        request = request.header(name, value);
    }

    let result = request.send().await;
    let response = match result {
        Ok(response) => response,
        Err(err) => {
            let translated = translate_transport_error(&err, call.upstream);
            if matches!(translated, ApiError::GatewayTimeout { .. } | ApiError::ServiceUnavailable { .. }) {
                state.circuit_breaker.record_failure(call.upstream);
            }
            return Err(translated);
        }
    };

    let status = response.status();
    if status.is_server_error() {
        state.circuit_breaker.record_failure(call.upstream);
    } else {
        state.circuit_breaker.record_success(call.upstream);
    }

    if status == reqwest::StatusCode::NOT_FOUND {
        let (resource_type, id) = infer_resource_from_path(&call.path);
        return Err(ApiError::not_found(&resource_type, &id));
    }
    if status.is_client_error() || status.is_server_error() {
        return Err(synthesize_from_status(status));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let content_length = response.content_length();

    Ok(StreamedUpstreamResponse { content_type, content_length, response })
}

/// Forwards a spooled upload as `multipart/form-data` (spec §4.6). The
/// gateway already validated size/extension in `UploadSpool::spool`.
pub async fn dispatch_multipart(
    state: &AppState,
    call: UpstreamCall,
    filename: String,
    bytes: Vec<u8>,
    tenant_id: Uuid,
) -> Result<DispatchOutcome, ApiError> {
    if state.circuit_breaker.admit(call.upstream) == Admission::Reject {
        return Err(ApiError::service_unavailable(format!("{} is currently unavailable", call.upstream)));
    }

    let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
    let form = reqwest::multipart::Form::new().part("file", part);

    let url = format!("{}{}", call.base_url.trim_end_matches('/'), call.path);
    let mut request = state
        .http_client
        .request(call.method.clone(), &url)
        .timeout(state.config.request_timeout)
        .header("X-Api-Key", &call.api_key)
        .header("X-Tenant-Id", tenant_id.to_string())
        .header("X-Request-Id", &call.request_id)
        .query(&call.query)
        .multipart(form);

    for (name, value) in &call.forwarded_headers {
        request = request.header(name, value);
    }

    let result = request.send().await;
    let response = match result {
        Ok(response) => response,
        Err(err) => {
            let translated = translate_transport_error(&err, call.upstream);
            if matches!(translated, ApiError::GatewayTimeout { .. } | ApiError::ServiceUnavailable { .. }) {
                state.circuit_breaker.record_failure(call.upstream);
            }
            return Err(translated);
        }
    };

    let status = response.status();
    if status.is_server_error() {
        state.circuit_breaker.record_failure(call.upstream);
    } else {
        state.circuit_breaker.record_success(call.upstream);
    }

    if status == reqwest::StatusCode::NOT_FOUND {
        let (resource_type, id) = infer_resource_from_path(&call.path);
        return Err(ApiError::not_found(&resource_type, &id));
    }
    if status.is_client_error() || status.is_server_error() {
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if looks_like_error_envelope(&body) {
            return Err(synthesize_from_envelope(status, body));
        }
        return Err(synthesize_from_status(status));
    }

    if status == reqwest::StatusCode::NO_CONTENT {
        return Ok(DispatchOutcome { status: to_axum_status(status), body: None });
    }

    let bytes = response.bytes().await.map_err(|err| ApiError::internal(format!("invalid upstream response: {err}")))?;
    if bytes.is_empty() {
        return Ok(DispatchOutcome { status: to_axum_status(status), body: None });
    }

    let body: Value = serde_json::from_slice(&bytes)
        .map_err(|err| ApiError::internal(format!("invalid upstream response: {err}")))?;
    Ok(DispatchOutcome { status: to_axum_status(status), body: Some(normalize_envelope(body)) })
}

fn translate_transport_error(err: &reqwest::Error, upstream: &str) -> ApiError {
    if err.is_timeout() {
        ApiError::gateway_timeout(format!("{upstream} timed out"))
    } else if err.is_connect() {
        ApiError::service_unavailable(format!("{upstream} is unreachable"))
    } else {
        ApiError::internal(format!("{upstream} request failed: {err}"))
    }
}

fn infer_resource_from_path(path: &str) -> (String, String) {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match segments.as_slice() {
        [resource, id, ..] => (resource.to_string(), id.to_string()),
        [resource] => (resource.to_string(), "unknown".to_string()),
        [] => ("resource".to_string(), "unknown".to_string()),
    }
}

fn looks_like_error_envelope(body: &Value) -> bool {
    body.get("error").is_some() && body.get("message").is_some()
}

fn synthesize_from_envelope(status: reqwest::StatusCode, body: Value) -> ApiError {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("upstream returned an error")
        .to_string();
    synthesize_from_status_with_message(status, message)
}

fn synthesize_from_status(status: reqwest::StatusCode) -> ApiError {
    synthesize_from_status_with_message(status, "upstream returned an error".to_string())
}

fn synthesize_from_status_with_message(status: reqwest::StatusCode, message: String) -> ApiError {
    match status {
        reqwest::StatusCode::BAD_REQUEST => ApiError::bad_request("ERR_UPSTREAM_BAD_REQUEST", message),
        reqwest::StatusCode::UNAUTHORIZED => ApiError::unauthorized(message),
        reqwest::StatusCode::FORBIDDEN => ApiError::forbidden(message),
        reqwest::StatusCode::CONFLICT => ApiError::conflict(message),
        reqwest::StatusCode::UNPROCESSABLE_ENTITY => {
            ApiError::validation(vec![FieldError { field: "body".to_string(), message }])
        }
        reqwest::StatusCode::PAYLOAD_TOO_LARGE => ApiError::payload_too_large(message),
        status if status.is_server_error() => ApiError::internal(message),
        _ => ApiError::internal(message),
    }
}

const PAGINATION_FIELDS: &[&str] = &["page", "limit", "total", "totalPages", "hasMore"];

/// If the body already matches `{success, data[, metadata]}`, pass through;
/// otherwise wrap it in a `SuccessEnvelope` and detect pagination metadata
/// per spec §4.6.
fn normalize_envelope(body: Value) -> Value {
    if let Value::Object(ref map) = body {
        if map.get("success").and_then(Value::as_bool) == Some(true) && map.contains_key("data") {
            return body;
        }

        for key in ["metadata", "meta", "pagination"] {
            if let Some(meta) = map.get(key) {
                return to_value(SuccessEnvelope::with_metadata(body.clone(), meta.clone()));
            }
        }

        let pagination: Map<String, Value> = PAGINATION_FIELDS
            .iter()
            .filter_map(|field| map.get(*field).map(|v| (field.to_string(), v.clone())))
            .collect();
        if !pagination.is_empty() {
            return to_value(SuccessEnvelope::with_metadata(body.clone(), Value::Object(pagination)));
        }
    }

    to_value(SuccessEnvelope::new(body))
}

fn to_value<T: serde::Serialize>(envelope: SuccessEnvelope<T>) -> Value {
    serde_json::to_value(envelope).unwrap_or(Value::Null)
}
