use std::collections::HashMap;

use crate::{principal::Principal, roles::Role, SecurityError};

/// The AuthZ-relevant subset of a route's static metadata. The gateway's
/// `RouteMetadata` carries more (path pattern, `public`, `skipThrottle`);
/// this is the slice the policy decision actually reads.
#[derive(Debug, Clone, Default)]
pub struct RouteAuthz {
    pub resource: Option<String>,
    pub action: Option<String>,
    pub required_roles: Vec<Role>,
}

/// `(resource, action) -> roles-allowed`, consulted once a route's
/// required-roles shortcut and the admin bypass have both missed.
#[derive(Debug, Default, Clone)]
pub struct PolicyTable {
    entries: HashMap<(String, String), Vec<Role>>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, resource: impl Into<String>, action: impl Into<String>, roles: Vec<Role>) -> Self {
        self.entries.insert((resource.into(), action.into()), roles);
        self
    }

    fn roles_for(&self, resource: &str, action: &str) -> Option<&[Role]> {
        self.entries.get(&(resource.to_string(), action.to_string())).map(|v| v.as_slice())
    }

    /// Implements spec §4.2's four-step precedence.
    pub fn authorize(&self, principal: &Principal, route: &RouteAuthz) -> Result<(), SecurityError> {
        if !route.required_roles.is_empty() && route.required_roles.iter().any(|r| principal.has_role(r.clone())) {
            return Ok(());
        }

        let (resource, action) = match (&route.resource, &route.action) {
            (Some(r), Some(a)) => (r, a),
            _ => return Err(SecurityError::RouteMisconfigured),
        };

        if principal.is_admin() {
            return Ok(());
        }

        let denied = || SecurityError::Denied {
            resource: resource.clone(),
            action: action.clone(),
        };

        let allowed = self.roles_for(resource, action).ok_or_else(denied)?;
        if principal.roles.iter().any(|r| allowed.contains(r)) {
            Ok(())
        } else {
            Err(denied())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn mk_principal(roles: Vec<&str>) -> Principal {
        Principal {
            kind: crate::principal::PrincipalKind::User,
            id: "u1".into(),
            tenant_id: Uuid::new_v4(),
            tenant_name: None,
            roles: roles.into_iter().map(Role::new).collect(),
            source_service: None,
        }
    }

    fn table() -> PolicyTable {
        PolicyTable::new()
            .allow("orders", "read", vec![Role::new("viewer"), Role::new("editor")])
            .allow("orders", "write", vec![Role::new("editor")])
    }

    #[test]
    fn required_roles_on_route_short_circuit_the_table() {
        let principal = mk_principal(vec!["on-call"]);
        let route = RouteAuthz {
            resource: Some("orders".into()),
            action: Some("write".into()),
            required_roles: vec![Role::new("on-call")],
        };
        assert!(table().authorize(&principal, &route).is_ok());
    }

    #[test]
    fn missing_resource_or_action_denies() {
        let principal = mk_principal(vec!["editor"]);
        let route = RouteAuthz { resource: Some("orders".into()), action: None, required_roles: vec![] };
        assert_eq!(table().authorize(&principal, &route), Err(SecurityError::RouteMisconfigured));
    }

    #[test]
    fn admin_bypasses_the_table() {
        let principal = mk_principal(vec!["admin"]);
        let route = RouteAuthz { resource: Some("unknown-resource".into()), action: Some("anything".into()), required_roles: vec![] };
        assert!(table().authorize(&principal, &route).is_ok());
    }

    #[test]
    fn viewer_cannot_write() {
        let principal = mk_principal(vec!["viewer"]);
        let route = RouteAuthz { resource: Some("orders".into()), action: Some("write".into()), required_roles: vec![] };
        assert!(table().authorize(&principal, &route).is_err());
    }

    #[test]
    fn unknown_resource_denies() {
        let principal = mk_principal(vec!["editor"]);
        let route = RouteAuthz { resource: Some("invoices".into()), action: Some("read".into()), required_roles: vec![] };
        assert!(table().authorize(&principal, &route).is_err());
    }
}
