use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use common_http_errors::ApiError;
use common_security::{Principal, Role, RouteAuthz, SecurityError};

use crate::app_state::AppState;
use crate::context::RouteMetadata;

/// Consults `common_security::PolicyTable` once AuthN has resolved a
/// `Principal` (or skipped, for public routes) — spec §4.2.
pub async fn authz_middleware(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let route = request
        .extensions()
        .get::<RouteMetadata>()
        .cloned()
        .unwrap_or_default();

    if route.public {
        return Ok(next.run(request).await);
    }

    let principal = request
        .extensions()
        .get::<Principal>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("missing principal"))?;

    let route_authz = RouteAuthz {
        resource: route.resource.map(str::to_string),
        action: route.action.map(str::to_string),
        required_roles: route.required_roles.iter().map(|r| Role::new(*r)).collect(),
    };

    state.policy.authorize(&principal, &route_authz).map_err(|err| match err {
        SecurityError::Denied { resource, action } => {
            ApiError::forbidden(format!("You don't have permission to {action} this {resource}"))
        }
        SecurityError::RouteMisconfigured => ApiError::forbidden("this route has no authorization policy"),
    })?;

    Ok(next.run(request).await)
}
