use async_trait::async_trait;
use dashmap::DashMap;
use tenantgate_core_types::ProjectId;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tenant registry unavailable: {0}")]
    Unavailable(String),
}

/// Source of truth for project to schema mappings.
#[async_trait]
pub trait TenantRegistry: Send + Sync {
    /// `Ok(None)` means the project has no schema.
    async fn lookup_tenant_schema(&self, project: &ProjectId)
        -> Result<Option<String>, RegistryError>;
}

/// Registry seeded from configuration, used by single-instance deployments and tests.
#[derive(Default)]
pub struct InMemoryTenantRegistry {
    tenants: DashMap<ProjectId, String>,
}

impl InMemoryTenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenants(tenants: impl IntoIterator<Item = (ProjectId, String)>) -> Self {
        let registry = Self::new();
        for (project, schema) in tenants {
            registry.insert(project, schema);
        }
        registry
    }

    pub fn insert(&self, project: ProjectId, schema: impl Into<String>) {
        self.tenants.insert(project, schema.into());
    }

    pub fn remove(&self, project: &ProjectId) -> Option<String> {
        self.tenants.remove(project).map(|(_, schema)| schema)
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

#[async_trait]
impl TenantRegistry for InMemoryTenantRegistry {
    async fn lookup_tenant_schema(
        &self,
        project: &ProjectId,
    ) -> Result<Option<String>, RegistryError> {
        Ok(self.tenants.get(project).map(|entry| entry.value().clone()))
    }
}
