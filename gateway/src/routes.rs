use crate::context::RouteMetadata;

/// One entry in the static route table: a path prefix and the metadata
/// every request under it carries. Longest-prefix match wins, mirroring
/// the one-for-one path-prefix routing spec §6 describes.
struct RouteEntry {
    prefix: &'static str,
    meta: RouteMetadata,
}

fn table() -> Vec<RouteEntry> {
    vec![
        RouteEntry {
            prefix: "/health",
            meta: RouteMetadata { public: true, skip_throttle: true, ..Default::default() },
        },
        RouteEntry {
            prefix: "/api/health",
            meta: RouteMetadata { public: true, skip_throttle: true, ..Default::default() },
        },
        RouteEntry {
            prefix: "/system-check-key",
            meta: RouteMetadata {
                resource: Some("system"),
                action: Some("read"),
                ..Default::default()
            },
        },
        RouteEntry {
            prefix: "/system-check",
            meta: RouteMetadata { public: true, skip_throttle: true, ..Default::default() },
        },
        RouteEntry {
            prefix: "/api/service-a/items",
            meta: RouteMetadata { resource: Some("service-a.items"), action: Some("read"), ..Default::default() },
        },
        RouteEntry {
            prefix: "/api/service-a/categories",
            meta: RouteMetadata { resource: Some("service-a.categories"), action: Some("read"), ..Default::default() },
        },
        RouteEntry {
            prefix: "/api/service-a/statistics",
            meta: RouteMetadata { resource: Some("service-a.statistics"), action: Some("read"), ..Default::default() },
        },
        RouteEntry {
            prefix: "/api/service-b/reports",
            meta: RouteMetadata { resource: Some("service-b.reports"), action: Some("read"), ..Default::default() },
        },
        RouteEntry {
            prefix: "/api/service-b/notifications",
            meta: RouteMetadata { resource: Some("service-b.notifications"), action: Some("write"), ..Default::default() },
        },
        RouteEntry {
            prefix: "/api/service-c/files",
            meta: RouteMetadata { resource: Some("service-c.files"), action: Some("write"), ..Default::default() },
        },
        RouteEntry {
            prefix: "/api/service-c/folders",
            meta: RouteMetadata { resource: Some("service-c.folders"), action: Some("write"), ..Default::default() },
        },
    ]
}

/// Resource-intensive operations that opt in to the tenant-scoped
/// rate-limit triple when `ENABLE_TENANT_RATE_LIMITS` is set (spec §9 open
/// question).
pub fn is_tenant_scoped(resource: &str) -> bool {
    matches!(
        resource,
        "service-a.statistics" | "service-b.reports" | "service-c.files"
    )
}

/// Longest-prefix match against the static table; unmatched paths get the
/// default metadata (not public, no required roles, no resource/action —
/// which AuthZ denies per its step 2).
pub fn match_route(path: &str) -> RouteMetadata {
    if RouteMetadata::is_health_path(path) {
        return RouteMetadata { public: true, skip_throttle: true, ..Default::default() };
    }

    table()
        .into_iter()
        .filter(|entry| path.starts_with(entry.prefix))
        .max_by_key(|entry| entry.prefix.len())
        .map(|entry| entry.meta)
        .unwrap_or_default()
}
