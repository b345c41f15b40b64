use std::sync::Arc;

use isolation_guards::ConnectionPool;
use request_trace::CorrelationTracer;
use tenant_resolver::InMemoryTenantRegistry;

use crate::auth::{Authenticator, StaticKeyAuthenticator};
use crate::config::{ConfigError, GatewayConfig};
use crate::gateway::Gateway;

#[derive(Clone)]
pub struct AppState {
    gateway: Arc<Gateway>,
    authenticator: Arc<dyn Authenticator>,
    tracer: CorrelationTracer,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            gateway,
            authenticator,
            tracer: CorrelationTracer,
        }
    }

    /// Wires the in-memory registry and key table seeded from `config`.
    pub fn from_config(
        config: &GatewayConfig,
        pool: Arc<dyn ConnectionPool>,
    ) -> Result<Self, ConfigError> {
        let registry = InMemoryTenantRegistry::with_tenants(
            config
                .tenants
                .iter()
                .map(|tenant| (tenant.project_id, tenant.schema.clone())),
        );
        let gateway = Gateway::new(Arc::new(registry), pool, config.tenant_cache_ttl()?);
        let authenticator = StaticKeyAuthenticator::from_seeds(&config.api_keys);
        Ok(Self::new(Arc::new(gateway), Arc::new(authenticator)))
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn authenticator(&self) -> &Arc<dyn Authenticator> {
        &self.authenticator
    }

    pub fn tracer(&self) -> CorrelationTracer {
        self.tracer
    }
}
