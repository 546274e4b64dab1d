/// Static policy attached to a route, matched once at dispatch time and
/// read by every pipeline stage (spec §3). Threaded through `Extension`
/// alongside `Principal` and `CorrelationId` rather than a single combined
/// request-context struct.
#[derive(Debug, Clone, Default)]
pub struct RouteMetadata {
    pub resource: Option<&'static str>,
    pub action: Option<&'static str>,
    pub required_roles: Vec<&'static str>,
    pub public: bool,
    pub skip_throttle: bool,
}

impl RouteMetadata {
    pub fn is_health_path(path: &str) -> bool {
        path == "/health" || path == "/api/health" || path.ends_with("/health")
    }
}
