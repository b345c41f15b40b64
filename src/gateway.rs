//! Request-level composition of the guards.
//!
//! Every operation runs in the same order: capability scope, then isolation,
//! then the backing service. A request that fails either check never reaches
//! the backend.

use std::sync::Arc;
use std::time::Duration;

use isolation_guards::{
    assert_path, assert_query_isolation, assert_search_path_untouched, assert_single_statement,
    build_path, ChannelType, ConnectionPool, ParsedPath, ScopedConnection, Subscription,
    SubscriptionManager, SubscriptionStore,
};
use request_trace::{RequestTraceRecorder, TraceKey, TraceSink};
use scope_enforcer::{required_scope, CapabilityScopeEnforcer, ScopeDecision};
use serde::Serialize;
use tenant_resolver::{TenantRegistry, TenantResolver};
use tenantgate_core_types::{CorrelationId, GateError, GateResult, ProjectId, ServiceName};
use tracing::{debug, info, instrument};

use crate::auth::Principal;

const SUBSCRIBE_OPERATION: &str = "realtime:subscribe";

/// Identity of one request as it moves through the gateway: the client-facing
/// correlation id and, when the request is being traced, its trace record.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub correlation: CorrelationId,
    pub trace: Option<TraceKey>,
}

impl RequestContext {
    pub fn new(correlation: CorrelationId) -> Self {
        Self {
            correlation,
            trace: None,
        }
    }

    pub fn traced(correlation: CorrelationId, trace: TraceKey) -> Self {
        Self {
            correlation,
            trace: Some(trace),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueryOutcome {
    pub rows_affected: u64,
}

pub struct Gateway {
    enforcer: CapabilityScopeEnforcer,
    resolver: TenantResolver,
    subscriptions: SubscriptionManager,
    pool: Arc<dyn ConnectionPool>,
    recorder: Arc<RequestTraceRecorder>,
}

impl Gateway {
    pub fn new(
        registry: Arc<dyn TenantRegistry>,
        pool: Arc<dyn ConnectionPool>,
        tenant_cache_ttl: Duration,
    ) -> Self {
        Self {
            enforcer: CapabilityScopeEnforcer::new(),
            resolver: TenantResolver::new(registry, tenant_cache_ttl),
            subscriptions: SubscriptionManager::default(),
            pool,
            recorder: Arc::new(RequestTraceRecorder::default()),
        }
    }

    pub fn with_subscription_store(mut self, store: Arc<dyn SubscriptionStore>) -> Self {
        self.subscriptions = SubscriptionManager::new(store);
        self
    }

    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.recorder = Arc::new(RequestTraceRecorder::new(sink));
        self
    }

    pub fn enforcer(&self) -> &CapabilityScopeEnforcer {
        &self.enforcer
    }

    pub fn recorder(&self) -> &Arc<RequestTraceRecorder> {
        &self.recorder
    }

    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }

    fn authorize(
        &self,
        principal: &Principal,
        ctx: &RequestContext,
        operation: &str,
    ) -> GateResult<ScopeDecision> {
        self.enforcer
            .assert_scope_for(&principal.credential, operation, Some(&ctx.correlation))
    }

    fn log_hit(&self, ctx: &RequestContext, service: ServiceName) {
        if let Some(trace) = ctx.trace {
            self.recorder.log_service_hit(trace, service);
        }
    }

    /// Runs `statement` inside the caller's tenant schema.
    #[instrument(skip_all, fields(request_id = %ctx.correlation, operation = %operation))]
    pub async fn query(
        &self,
        principal: &Principal,
        ctx: &RequestContext,
        operation: &str,
        statement: &str,
    ) -> GateResult<QueryOutcome> {
        ensure_operation(operation, "db:")?;
        self.authorize(principal, ctx, operation)?;

        let schema = self.resolver.resolve_schema(&principal.project_id).await?;
        assert_single_statement(statement)?;
        assert_search_path_untouched(statement)?;
        assert_query_isolation(statement, &schema)?;

        let mut conn = ScopedConnection::checkout(self.pool.as_ref(), &schema).await?;
        let rows_affected = conn.execute(statement).await?;
        self.log_hit(ctx, ServiceName::Database);
        debug!(schema = %schema, rows_affected, "statement executed");
        Ok(QueryOutcome { rows_affected })
    }

    /// Subscribes the caller to one of its own channels.
    pub async fn subscribe(
        &self,
        principal: &Principal,
        ctx: &RequestContext,
        channel_type: ChannelType,
        identifier: Option<&str>,
    ) -> GateResult<Subscription> {
        self.authorize(principal, ctx, SUBSCRIBE_OPERATION)?;
        let subscription = self
            .subscriptions
            .subscribe_to(&principal.project_id, channel_type, identifier)
            .await?;
        self.log_hit(ctx, ServiceName::Realtime);
        Ok(subscription)
    }

    /// Subscribes to a fully qualified channel name supplied by the client.
    pub async fn subscribe_channel(
        &self,
        principal: &Principal,
        ctx: &RequestContext,
        channel: &str,
    ) -> GateResult<Subscription> {
        self.authorize(principal, ctx, SUBSCRIBE_OPERATION)?;
        let subscription = self
            .subscriptions
            .subscribe(Some(&principal.project_id), channel)
            .await?;
        self.log_hit(ctx, ServiceName::Realtime);
        Ok(subscription)
    }

    /// `None` when the id is unknown or belongs to another project.
    pub async fn unsubscribe(
        &self,
        principal: &Principal,
        ctx: &RequestContext,
        subscription_id: &str,
    ) -> GateResult<Option<Subscription>> {
        self.authorize(principal, ctx, SUBSCRIBE_OPERATION)?;
        let removed = self
            .subscriptions
            .unsubscribe(&principal.project_id, subscription_id)
            .await;
        self.log_hit(ctx, ServiceName::Realtime);
        Ok(removed)
    }

    pub async fn list_subscriptions(
        &self,
        principal: &Principal,
        ctx: &RequestContext,
    ) -> GateResult<Vec<Subscription>> {
        self.authorize(principal, ctx, SUBSCRIBE_OPERATION)?;
        let subscriptions = self.subscriptions.list(&principal.project_id).await;
        self.log_hit(ctx, ServiceName::Realtime);
        Ok(subscriptions)
    }

    /// Scopes a project-relative object path for the storage backend.
    pub fn storage_path(
        &self,
        principal: &Principal,
        ctx: &RequestContext,
        operation: &str,
        path: &str,
    ) -> GateResult<String> {
        ensure_operation(operation, "storage:")?;
        self.authorize(principal, ctx, operation)?;
        let scoped = build_path(&principal.project_id, path)?;
        self.log_hit(ctx, ServiceName::Storage);
        Ok(scoped)
    }

    /// Checks a client-supplied scoped path before the storage backend sees it.
    pub fn validate_storage_path(
        &self,
        principal: &Principal,
        ctx: &RequestContext,
        operation: &str,
        scoped_path: &str,
    ) -> GateResult<ParsedPath> {
        ensure_operation(operation, "storage:")?;
        self.authorize(principal, ctx, operation)?;
        let parsed = assert_path(scoped_path, Some(&principal.project_id))?;
        self.log_hit(ctx, ServiceName::Storage);
        Ok(parsed)
    }

    /// Drops a suspended or deleted project's subscriptions and cached schema.
    pub async fn suspend_project(&self, project: &ProjectId) -> usize {
        let removed = self.subscriptions.clear_project(project).await;
        self.resolver.invalidate(project).await;
        info!(project_id = %project, removed, "project suspended");
        removed
    }

    /// Unfinished traces older than `max_age` are dropped.
    pub fn prune_traces(&self, max_age: Duration) -> usize {
        self.recorder.prune_stale(max_age)
    }
}

/// Endpoints only dispatch operations they serve and that carry a scope.
fn ensure_operation(operation: &str, prefix: &str) -> GateResult<()> {
    if operation.starts_with(prefix) && required_scope(operation).is_some() {
        Ok(())
    } else {
        Err(GateError::UnsupportedOperation(operation.to_string()))
    }
}
