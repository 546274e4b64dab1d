use serde::{Deserialize, Serialize};
use std::fmt;

/// Spec §3 describes roles as "a set of strings"; rather than a fixed
/// hierarchy (the teacher's POS roles are a closed enum — `SuperAdmin`,
/// `Manager`, `Cashier`, ...) this gateway's roles are open-ended, since
/// they're minted per-tenant by the upstream identity provider. `Role::ADMIN`
/// is the one name the spec itself treats specially (AuthZ bypass, §4.2).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    pub const ADMIN: &'static str = "admin";
    pub const USER: &'static str = "user";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn is_admin(&self) -> bool {
        self.0 == Self::ADMIN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Role::new(value)
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Role::new(value)
    }
}
