pub mod model;
pub mod table;

pub use crate::model::{
    CapabilityScope, Credential, KeyEnvironment, KeyStatus, KeyType, McpAccessLevel, UnknownScope,
};
pub use crate::table::{is_mcp_read_only, is_write_operation, required_scope, OPERATION_SCOPES};

use std::time::SystemTime;

use serde::Serialize;
use tenantgate_core_types::{CorrelationId, GateError, GateResult, PermissionDenial};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Outcome of a successful scope check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeDecision {
    pub operation: String,
    pub required_scope: Option<CapabilityScope>,
    pub mcp_restricted: bool,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Granted,
    Denied,
}

/// Audit record emitted for every scope decision, granted or denied.
#[derive(Clone, Debug, Serialize)]
pub struct ScopeAuditEvent {
    pub correlation_id: Option<String>,
    pub credential_id: String,
    pub key_type: KeyType,
    pub operation: String,
    pub required_scope: Option<CapabilityScope>,
    pub mcp_restricted: bool,
    pub verdict: Verdict,
    pub reason: Option<&'static str>,
    pub timestamp: SystemTime,
}

/// Maps operations to required scopes and checks them against a credential.
pub struct CapabilityScopeEnforcer {
    events: broadcast::Sender<ScopeAuditEvent>,
}

impl Default for CapabilityScopeEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityScopeEnforcer {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self { events: tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScopeAuditEvent> {
        self.events.subscribe()
    }

    pub fn assert_scope(
        &self,
        credential: &Credential,
        operation: &str,
    ) -> GateResult<ScopeDecision> {
        self.assert_scope_for(credential, operation, None)
    }

    /// Same as [`assert_scope`](Self::assert_scope), tagging the audit record with the request.
    pub fn assert_scope_for(
        &self,
        credential: &Credential,
        operation: &str,
        correlation: Option<&CorrelationId>,
    ) -> GateResult<ScopeDecision> {
        let required = required_scope(operation);
        let mcp_restricted = is_mcp_read_only(credential);
        let outcome = evaluate(credential, operation, required, mcp_restricted);

        let event = ScopeAuditEvent {
            correlation_id: correlation.map(|id| id.to_string()),
            credential_id: credential.id.clone(),
            key_type: credential.key_type,
            operation: operation.to_string(),
            required_scope: required,
            mcp_restricted,
            verdict: if outcome.is_ok() {
                Verdict::Granted
            } else {
                Verdict::Denied
            },
            reason: outcome.as_ref().err().map(|denial| denial.reason()),
            timestamp: SystemTime::now(),
        };
        self.record(&event);

        match outcome {
            Ok(()) => Ok(ScopeDecision {
                operation: operation.to_string(),
                required_scope: required,
                mcp_restricted,
            }),
            Err(denial) => Err(GateError::PermissionDenied(denial)),
        }
    }

    /// Operations from the table this credential may perform, under the same rules as `assert_scope`.
    pub fn permitted_operations(&self, credential: &Credential) -> Vec<&'static str> {
        let mcp_restricted = is_mcp_read_only(credential);
        OPERATION_SCOPES
            .iter()
            .filter(|(name, scope)| {
                evaluate(credential, name, Some(*scope), mcp_restricted).is_ok()
            })
            .map(|(name, _)| *name)
            .collect()
    }

    fn record(&self, event: &ScopeAuditEvent) {
        let required = event.required_scope.map(|scope| scope.as_str());
        match event.verdict {
            Verdict::Granted => info!(
                target: "scope-enforcer",
                correlation_id = event.correlation_id.as_deref(),
                credential_id = %event.credential_id,
                key_type = %event.key_type,
                operation = %event.operation,
                required_scope = required,
                mcp_restricted = event.mcp_restricted,
                granted = true,
                "scope granted"
            ),
            Verdict::Denied => warn!(
                target: "scope-enforcer",
                correlation_id = event.correlation_id.as_deref(),
                credential_id = %event.credential_id,
                key_type = %event.key_type,
                operation = %event.operation,
                required_scope = required,
                mcp_restricted = event.mcp_restricted,
                granted = false,
                reason = event.reason,
                "scope denied"
            ),
        }

        if self.events.send(event.clone()).is_err() {
            debug!(target: "scope-enforcer", "no audit listeners attached");
        }
    }
}

fn evaluate(
    credential: &Credential,
    operation: &str,
    required: Option<CapabilityScope>,
    mcp_restricted: bool,
) -> Result<(), PermissionDenial> {
    let Some(scope) = required else {
        debug!(target: "scope-enforcer", operation, "operation has no scope mapping");
        return Ok(());
    };

    // Checked before scope membership so a misissued read-only token still cannot write.
    if mcp_restricted && scope.is_write_class() {
        return Err(PermissionDenial::McpWriteDenied {
            required_scope: scope.as_str().to_string(),
            service: scope.service().to_string(),
            key_type: credential.key_type.as_str().to_string(),
        });
    }

    if !credential.has_scope(scope) {
        return Err(PermissionDenial::MissingScope {
            required_scope: scope.as_str().to_string(),
            service: scope.service().to_string(),
            key_type: credential.key_type.as_str().to_string(),
        });
    }

    Ok(())
}
