use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::roles::Role;

/// How the caller proved its identity (spec §3: `Principal.kind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrincipalKind {
    ApiKey,
    User,
    Service,
}

/// The authenticated caller identity, resolved by AuthN and immutable for
/// the rest of the request's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub kind: PrincipalKind,
    pub id: String,
    pub tenant_id: Uuid,
    pub tenant_name: Option<String>,
    /// Never null — absence of roles is the empty set, which denies every
    /// role-gated action (spec §3 invariant).
    pub roles: Vec<Role>,
    pub source_service: Option<String>,
}

impl Principal {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }
}
