use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tenantgate_core_types::ProjectId;

/// Storage for resolved mappings. Swap for a shared store when running several gateways.
#[async_trait]
pub trait SchemaCache: Send + Sync {
    async fn get(&self, project: &ProjectId) -> Option<String>;
    async fn put(&self, project: ProjectId, schema: String);
    async fn invalidate(&self, project: &ProjectId);
    async fn clear(&self);
}

#[derive(Clone)]
struct CachedSchema {
    schema: String,
    expires_at: Instant,
}

impl CachedSchema {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Process-local cache. Expired entries are evicted when read.
pub struct InMemorySchemaCache {
    ttl: Duration,
    entries: DashMap<ProjectId, CachedSchema>,
}

impl InMemorySchemaCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SchemaCache for InMemorySchemaCache {
    async fn get(&self, project: &ProjectId) -> Option<String> {
        if let Some(entry) = self.entries.get(project) {
            if !entry.value().is_expired() {
                return Some(entry.value().schema.clone());
            }
        }
        self.entries
            .remove_if(project, |_, cached| cached.is_expired());
        None
    }

    async fn put(&self, project: ProjectId, schema: String) {
        let cached = CachedSchema {
            schema,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.insert(project, cached);
    }

    async fn invalidate(&self, project: &ProjectId) {
        self.entries.remove(project);
    }

    async fn clear(&self) {
        self.entries.clear();
    }
}
