use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One tenant's access grant on the caller's account. `access_type`
/// decides the principal's derived role: `ADMIN` becomes `{admin}`,
/// anything else becomes `{user}` (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccessEntry {
    #[serde(rename = "tenantId")]
    pub tenant_id: Uuid,
    #[serde(rename = "tenantName")]
    pub tenant_name: Option<String>,
    #[serde(rename = "type")]
    pub access_type: String,
}

impl UserAccessEntry {
    pub fn is_admin(&self) -> bool {
        self.access_type.eq_ignore_ascii_case("admin")
    }
}

/// The identity-provider's introspection response. Upstream responses carry
/// additional fields the gateway never reads; per spec §9's open-question
/// decision, only this enumerated set is treated as authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    pub id: String,
    pub email: Option<String>,
    #[serde(rename = "userAccess")]
    pub user_access: Vec<UserAccessEntry>,
}

impl UserData {
    /// The access entry for `tenant_id`, if the caller has any grant there.
    pub fn access_for(&self, tenant_id: Uuid) -> Option<&UserAccessEntry> {
        self.user_access.iter().find(|entry| entry.tenant_id == tenant_id)
    }
}
