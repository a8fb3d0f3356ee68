//! Caller identity as handed over by the identity layer, and the tenant scope
//! derived from it.

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub caller_id: String,
    pub role: String,
    pub tenant_id: Option<String>,
}

impl CallerIdentity {
    pub fn new(
        caller_id: impl Into<String>,
        role: impl Into<String>,
        tenant_id: Option<String>,
    ) -> Self {
        Self {
            caller_id: caller_id.into(),
            role: role.into(),
            tenant_id,
        }
    }

    /// Platform scope for the superuser role, otherwise the caller's tenant.
    /// A non-superuser without a tenant has no scope at all.
    pub fn scope(&self, superuser_role: &str) -> Result<TenantScope> {
        if self.role.eq_ignore_ascii_case(superuser_role) {
            return Ok(TenantScope::Platform);
        }
        match self.tenant_id.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => Ok(TenantScope::Tenant(t.to_string())),
            _ => Err(DispatchError::Forbidden(format!(
                "caller {} has no tenant association",
                self.caller_id
            ))),
        }
    }
}

/// Data-access boundary for one call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "tenant_id", rename_all = "snake_case")]
pub enum TenantScope {
    /// Platform-wide caller; sees every tenant.
    Platform,
    Tenant(String),
}

impl TenantScope {
    /// `None` for platform scope, matching the nullable column convention.
    pub fn tenant_id(&self) -> Option<&str> {
        match self {
            TenantScope::Platform => None,
            TenantScope::Tenant(t) => Some(t),
        }
    }

    /// Whether a record owned by `owner` is visible in this scope.
    pub fn allows(&self, owner: Option<&str>) -> bool {
        match self {
            TenantScope::Platform => true,
            TenantScope::Tenant(t) => owner == Some(t.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superuser_gets_platform_scope() {
        let id = CallerIdentity::new("root", "PLATFORM_ADMIN", None);
        assert_eq!(id.scope("platform_admin").unwrap(), TenantScope::Platform);
    }

    #[test]
    fn tenant_user_gets_own_tenant() {
        let id = CallerIdentity::new("u1", "manager", Some("A".into()));
        let scope = id.scope("platform_admin").unwrap();
        assert_eq!(scope.tenant_id(), Some("A"));
        assert!(scope.allows(Some("A")));
        assert!(!scope.allows(Some("B")));
        assert!(!scope.allows(None));
    }

    #[test]
    fn tenantless_non_superuser_is_forbidden() {
        let id = CallerIdentity::new("u2", "manager", Some("  ".into()));
        let err = id.scope("platform_admin").unwrap_err();
        assert_eq!(err.code(), "forbidden");
    }

    #[test]
    fn platform_scope_allows_everything() {
        assert!(TenantScope::Platform.allows(None));
        assert!(TenantScope::Platform.allows(Some("Z")));
    }
}
