use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::header::CONTENT_TYPE;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use tracing::{error, info, warn};

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// The gateway's single exception-to-response sink (spec §4.7). Runs as the
/// outermost middleware layer: captures the request path, lets everything
/// downstream run, then — if the response is an error envelope — stamps
/// `timestamp`/`path`/`requestId` and logs at a severity derived from the
/// status code. `X-Request-Id` must already be set on the response by the
/// correlation-id layer this one wraps; see `gateway::pipeline::correlation`.
pub async fn exception_mapper_layer(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    let status = response.status();

    if !status.is_client_error() && !status.is_server_error() {
        info!(%path, status = status.as_u16(), "request completed");
        return response;
    }

    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(%path, ?err, "failed to buffer error response body");
            return Response::from_parts(parts, Body::empty());
        }
    };

    let final_body = if is_json {
        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(mut value) => {
                if let Some(object) = value.as_object_mut() {
                    object.entry("path").or_insert_with(|| serde_json::json!(path));
                    object
                        .entry("timestamp")
                        .or_insert_with(|| serde_json::json!(Utc::now().to_rfc3339()));
                    if let Some(request_id) = &request_id {
                        object.insert("requestId".into(), serde_json::json!(request_id));
                    }
                }
                serde_json::to_vec(&value).unwrap_or_else(|_| bytes.to_vec())
            }
            Err(_) => bytes.to_vec(),
        }
    } else {
        bytes.to_vec()
    };

    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    let response = Response::from_parts(parts, Body::from(final_body));

    if status.is_server_error() {
        error!(%path, status = status.as_u16(), request_id, "request failed");
    } else {
        warn!(%path, status = status.as_u16(), request_id, "request rejected");
    }

    response
}
