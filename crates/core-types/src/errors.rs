use std::fmt;

use thiserror::Error;

/// Denial outcomes shared by every guard. None of them is retryable.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("invalid channel format: {0}")]
    InvalidChannelFormat(String),
    #[error("channel uses a reserved name")]
    InvalidChannelName,
    #[error("invalid storage path: {0}")]
    InvalidPathFormat(String),
    #[error("path traversal detected")]
    PathTraversalDetected,
    #[error("path contains an invalid character")]
    InvalidPathCharacter,
    #[error("project identity is required")]
    MissingProjectId,
    #[error("statement references a schema outside the caller's tenant")]
    CrossSchemaAccess,
    #[error("channel belongs to a different project")]
    CrossProjectChannel,
    #[error("storage path belongs to a different project")]
    CrossProjectPath,
    #[error("tenant not found")]
    TenantNotFound,
    #[error("tenant schema initialization failed: {0}")]
    SchemaInitFailed(String),
    #[error("{0}")]
    PermissionDenied(PermissionDenial),
    #[error("api key is invalid")]
    KeyInvalid,
    #[error("upstream unavailable: {0}")]
    Upstream(String),
    #[error("operation '{0}' is not served by this endpoint")]
    UnsupportedOperation(String),
    #[error("request must carry exactly one SQL statement")]
    MultipleStatements,
}

/// Why a credential was refused for an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PermissionDenial {
    MissingScope {
        required_scope: String,
        service: String,
        key_type: String,
    },
    McpWriteDenied {
        required_scope: String,
        service: String,
        key_type: String,
    },
}

impl PermissionDenial {
    pub fn reason(&self) -> &'static str {
        match self {
            PermissionDenial::MissingScope { .. } => "missing_scope",
            PermissionDenial::McpWriteDenied { .. } => "mcp_write_denied",
        }
    }

    pub fn required_scope(&self) -> &str {
        match self {
            PermissionDenial::MissingScope { required_scope, .. }
            | PermissionDenial::McpWriteDenied { required_scope, .. } => required_scope,
        }
    }

    pub fn service(&self) -> &str {
        match self {
            PermissionDenial::MissingScope { service, .. }
            | PermissionDenial::McpWriteDenied { service, .. } => service,
        }
    }

    pub fn key_type(&self) -> &str {
        match self {
            PermissionDenial::MissingScope { key_type, .. }
            | PermissionDenial::McpWriteDenied { key_type, .. } => key_type,
        }
    }
}

impl fmt::Display for PermissionDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionDenial::MissingScope {
                required_scope,
                service,
                ..
            } => write!(
                f,
                "api key is missing scope '{required_scope}' required by the {service} service"
            ),
            PermissionDenial::McpWriteDenied { required_scope, .. } => write!(
                f,
                "read-only MCP tokens cannot perform '{required_scope}'; use a read-write or admin MCP token"
            ),
        }
    }
}

/// Coarse grouping used to pick the transport status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    Format,
    Identity,
    Isolation,
    Resolution,
    Authorization,
    Upstream,
}

impl GateError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GateError::InvalidChannelFormat(_) => "INVALID_CHANNEL_FORMAT",
            GateError::InvalidChannelName => "INVALID_CHANNEL_NAME",
            GateError::InvalidPathFormat(_) => "INVALID_PATH_FORMAT",
            GateError::PathTraversalDetected => "PATH_TRAVERSAL_DETECTED",
            GateError::InvalidPathCharacter => "INVALID_PATH_CHARACTER",
            GateError::MissingProjectId => "MISSING_PROJECT_ID",
            GateError::CrossSchemaAccess => "CROSS_SCHEMA_ACCESS",
            GateError::CrossProjectChannel => "CROSS_PROJECT_CHANNEL",
            GateError::CrossProjectPath => "CROSS_PROJECT_PATH",
            GateError::TenantNotFound => "TENANT_NOT_FOUND",
            GateError::SchemaInitFailed(_) => "SCHEMA_INIT_FAILED",
            GateError::PermissionDenied(_) => "PERMISSION_DENIED",
            GateError::KeyInvalid => "KEY_INVALID",
            GateError::Upstream(_) => "UPSTREAM_UNAVAILABLE",
            GateError::UnsupportedOperation(_) => "UNSUPPORTED_OPERATION",
            GateError::MultipleStatements => "MULTIPLE_STATEMENTS",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            GateError::InvalidChannelFormat(_)
            | GateError::InvalidChannelName
            | GateError::InvalidPathFormat(_)
            | GateError::PathTraversalDetected
            | GateError::InvalidPathCharacter
            | GateError::UnsupportedOperation(_)
            | GateError::MultipleStatements => ErrorCategory::Format,
            GateError::MissingProjectId => ErrorCategory::Identity,
            GateError::CrossSchemaAccess
            | GateError::CrossProjectChannel
            | GateError::CrossProjectPath => ErrorCategory::Isolation,
            GateError::TenantNotFound | GateError::SchemaInitFailed(_) => {
                ErrorCategory::Resolution
            }
            GateError::PermissionDenied(_) | GateError::KeyInvalid => {
                ErrorCategory::Authorization
            }
            GateError::Upstream(_) => ErrorCategory::Upstream,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            GateError::TenantNotFound => 404,
            GateError::SchemaInitFailed(_) => 500,
            GateError::KeyInvalid => 401,
            other => match other.category() {
                ErrorCategory::Format => 400,
                ErrorCategory::Identity => 401,
                ErrorCategory::Isolation | ErrorCategory::Authorization => 403,
                ErrorCategory::Resolution => 500,
                ErrorCategory::Upstream => 502,
            },
        }
    }

    /// Message safe to hand to the caller. Infrastructure details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            GateError::SchemaInitFailed(_) => "tenant schema could not be initialized".into(),
            GateError::Upstream(_) => "upstream service unavailable".into(),
            other => other.to_string(),
        }
    }

    pub fn is_isolation_denial(&self) -> bool {
        self.category() == ErrorCategory::Isolation
    }
}

pub type GateResult<T> = Result<T, GateError>;
