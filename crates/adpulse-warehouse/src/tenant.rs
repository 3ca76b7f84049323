//! Tenant registry.
//!
//! Process-wide mapping from tenant short code to the warehouse view holding
//! that customer's data. Loaded once at startup from configuration and
//! immutable thereafter, so it needs no synchronization.

use adpulse_core::{Error, Result};
use std::collections::HashMap;

/// Immutable tenant short code -> warehouse view mapping
#[derive(Debug, Clone)]
pub struct TenantRegistry {
    views: HashMap<String, String>,
}

impl TenantRegistry {
    /// Build the registry from the configured mapping
    pub fn new(views: HashMap<String, String>) -> Self {
        Self { views }
    }

    /// Resolve a tenant short code to its warehouse view identifier
    pub fn resolve(&self, tenant: &str) -> Result<&str> {
        self.views
            .get(tenant)
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownTenant(tenant.to_string()))
    }

    /// Whether a tenant is registered
    pub fn contains(&self, tenant: &str) -> bool {
        self.views.contains_key(tenant)
    }

    /// Registered tenant short codes
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.views.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_tenant() {
        let registry = TenantRegistry::new(HashMap::from([(
            "tl".to_string(),
            "warehouse.tl_daily".to_string(),
        )]));
        assert_eq!(registry.resolve("tl").unwrap(), "warehouse.tl_daily");
        assert!(registry.contains("tl"));
    }

    #[test]
    fn test_unknown_tenant_surfaces_immediately() {
        let registry = TenantRegistry::new(HashMap::new());
        let err = registry.resolve("zz").unwrap_err();
        assert!(matches!(err, Error::UnknownTenant(code) if code == "zz"));
    }
}
