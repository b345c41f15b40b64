//! Project identity to tenant schema resolution.

pub mod cache;
pub mod registry;

pub use cache::{InMemorySchemaCache, SchemaCache};
pub use registry::{InMemoryTenantRegistry, RegistryError, TenantRegistry};

use std::sync::Arc;
use std::time::Duration;

use tenantgate_core_types::{GateError, GateResult, ProjectId};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid ttl format: {0}")]
pub struct TtlError(pub String);

/// Parses a humantime duration such as `5m` or `90s`.
pub fn parse_ttl(raw: &str) -> Result<Duration, TtlError> {
    humantime::parse_duration(raw.trim()).map_err(|_| TtlError(raw.to_string()))
}

/// Cache-first resolver in front of a [`TenantRegistry`].
///
/// Misses for the same project may race and query the registry twice; both
/// write the same mapping.
pub struct TenantResolver {
    registry: Arc<dyn TenantRegistry>,
    cache: Arc<dyn SchemaCache>,
}

impl TenantResolver {
    pub fn new(registry: Arc<dyn TenantRegistry>, ttl: Duration) -> Self {
        Self::with_cache(registry, Arc::new(InMemorySchemaCache::new(ttl)))
    }

    pub fn with_cache(registry: Arc<dyn TenantRegistry>, cache: Arc<dyn SchemaCache>) -> Self {
        Self { registry, cache }
    }

    pub async fn resolve_schema(&self, project: &ProjectId) -> GateResult<String> {
        if let Some(schema) = self.cache.get(project).await {
            return Ok(schema);
        }

        let lookup = self.registry.lookup_tenant_schema(project).await;
        let schema = match lookup {
            Ok(Some(schema)) => schema,
            Ok(None) => {
                debug!(target: "tenant-resolver", project_id = %project, "no tenant schema");
                return Err(GateError::TenantNotFound);
            }
            Err(err) => {
                warn!(target: "tenant-resolver", project_id = %project, error = %err, "registry lookup failed");
                return Err(GateError::Upstream(err.to_string()));
            }
        };

        self.cache.put(*project, schema.clone()).await;
        debug!(target: "tenant-resolver", project_id = %project, schema = %schema, "tenant schema cached");
        Ok(schema)
    }

    /// Drops one mapping, e.g. after tenant metadata changed.
    pub async fn invalidate(&self, project: &ProjectId) {
        self.cache.invalidate(project).await;
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }
}
