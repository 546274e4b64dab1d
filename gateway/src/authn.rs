use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use common_http_errors::ApiError;
use common_security::{Principal, PrincipalKind, Role};
use tracing::warn;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::context::RouteMetadata;
use crate::routes;

const RECOGNIZED_INTERNAL_SERVICES: &[&str] = &["service-a", "service-b", "service-c"];

fn header<'a>(request: &'a Request<axum::body::Body>, name: &str) -> Option<&'a str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Resolves a `Principal` for the request, or passes it through with none
/// when the route is public/health (spec §4.1). Runs before AuthZ.
pub async fn authn_middleware(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();
    let route = routes::match_route(&path);

    if route.public || RouteMetadata::is_health_path(&path) {
        request.extensions_mut().insert(route);
        return Ok(next.run(request).await);
    }

    let api_key = header(&request, "x-api-key").map(str::to_string);
    let authorization = header(&request, "authorization").map(str::to_string);

    let principal = if let Some(key) = api_key.as_deref() {
        authenticate_api_key(&state, &request, key)?
    } else if let Some(auth_header) = authorization.as_deref() {
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?
            .trim();
        authenticate_bearer(&state, &request, token).await?
    } else {
        return Err(ApiError::unauthorized("missing credentials"));
    };

    request.extensions_mut().insert(route);
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

fn authenticate_api_key(
    state: &AppState,
    request: &Request<axum::body::Body>,
    key: &str,
) -> Result<Principal, ApiError> {
    if !state.config.static_api_tokens.iter().any(|token| token == key) {
        return Err(ApiError::unauthorized("invalid API key"));
    }

    let tenant_id = header(request, "x-tenant-id").and_then(|v| Uuid::parse_str(v).ok());
    let tenant_name = header(request, "x-tenant-name").map(str::to_string);
    let user_email = header(request, "x-user-email").map(str::to_string);
    let user_role = header(request, "x-user-role").map(str::to_string);
    let source_service = header(request, "x-source-service").map(str::to_string);

    let enriched = tenant_id.is_some() || tenant_name.is_some() || user_email.is_some() || user_role.is_some();

    if enriched {
        return Ok(Principal {
            kind: PrincipalKind::ApiKey,
            id: key.to_string(),
            tenant_id: tenant_id.unwrap_or_else(Uuid::nil),
            tenant_name,
            roles: user_role.map(|r| vec![Role::new(r)]).unwrap_or_default(),
            source_service,
        });
    }

    if let Some(service) = source_service.as_deref() {
        if RECOGNIZED_INTERNAL_SERVICES.contains(&service) {
            return Ok(Principal {
                kind: PrincipalKind::Service,
                id: key.to_string(),
                tenant_id: Uuid::nil(),
                tenant_name: None,
                roles: vec![Role::new(Role::ADMIN)],
                source_service: Some(service.to_string()),
            });
        }
    }

    warn!(key_suffix = %key.chars().rev().take(4).collect::<String>(), "API key accepted with no trust headers and no recognized source service");
    Ok(Principal {
        kind: PrincipalKind::ApiKey,
        id: key.to_string(),
        tenant_id: Uuid::nil(),
        tenant_name: None,
        roles: Vec::new(),
        source_service: None,
    })
}

async fn authenticate_bearer(
    state: &AppState,
    request: &Request<axum::body::Body>,
    token: &str,
) -> Result<Principal, ApiError> {
    let tenant_id = header(request, "x-tenant-id")
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| ApiError::unauthorized("missing tenant header"))?;

    let user_data = state.token_validator.validate(token).await.map_err(|err| {
        warn!(error = %err, "token introspection failed");
        ApiError::unauthorized("invalid bearer token")
    })?;

    let access = user_data
        .access_for(tenant_id)
        .ok_or_else(|| ApiError::unauthorized("token does not grant access to the requested tenant"))?;

    let role = if access.is_admin() { Role::new(Role::ADMIN) } else { Role::new(Role::USER) };

    Ok(Principal {
        kind: PrincipalKind::User,
        id: user_data.id.clone(),
        tenant_id,
        tenant_name: access.tenant_name.clone(),
        roles: vec![role],
        source_service: None,
    })
}
