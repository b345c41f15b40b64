use crate::model::{CapabilityScope, Credential, KeyType};

use CapabilityScope::*;

/// Gateway operation to the scope it requires. Operations absent here are unscoped.
pub const OPERATION_SCOPES: &[(&str, CapabilityScope)] = &[
    ("db:select", DbSelect),
    ("db:insert", DbInsert),
    ("db:update", DbUpdate),
    ("db:delete", DbDelete),
    ("db:upsert", DbInsert),
    ("db:rpc", DbSelect),
    ("storage:read", StorageRead),
    ("storage:list", StorageRead),
    ("storage:download", StorageRead),
    ("storage:write", StorageWrite),
    ("storage:upload", StorageWrite),
    ("storage:delete", StorageWrite),
    ("auth:signin", AuthSignin),
    ("auth:signout", AuthSignin),
    ("auth:refresh", AuthSignin),
    ("auth:signup", AuthSignup),
    ("auth:manage", AuthManage),
    ("auth:invite", AuthManage),
    ("realtime:subscribe", RealtimeSubscribe),
    ("realtime:presence", RealtimeSubscribe),
    ("realtime:publish", RealtimePublish),
    ("realtime:broadcast", RealtimePublish),
    ("graphql:execute", GraphqlExecute),
    ("graphql:query", GraphqlExecute),
    ("graphql:mutation", GraphqlExecute),
];

pub fn required_scope(operation: &str) -> Option<CapabilityScope> {
    OPERATION_SCOPES
        .iter()
        .find(|(name, _)| *name == operation)
        .map(|(_, scope)| *scope)
}

/// Write-class operations are the ones whose required scope is write-class.
pub fn is_write_operation(operation: &str) -> bool {
    required_scope(operation)
        .map(|scope| scope.is_write_class())
        .unwrap_or(false)
}

/// MCP token that holds at least one read scope and no write scope.
///
/// Classification looks at the granted scopes, not the declared tier, so a
/// token whose scopes drifted away from its tier is judged by what it holds.
pub fn is_mcp_read_only(credential: &Credential) -> bool {
    if credential.key_type != KeyType::Mcp {
        return false;
    }
    let has_read = credential.scopes.iter().any(|scope| !scope.is_write_class());
    let has_write = credential.scopes.iter().any(|scope| scope.is_write_class());
    has_read && !has_write
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::McpAccessLevel;

    #[test]
    fn every_scope_requires_itself() {
        for scope in CapabilityScope::ALL {
            assert_eq!(required_scope(scope.as_str()), Some(scope));
        }
    }

    #[test]
    fn unknown_operations_are_unscoped_and_not_writes() {
        assert_eq!(required_scope("functions:invoke"), None);
        assert!(!is_write_operation("functions:invoke"));
    }

    #[test]
    fn aliases_inherit_write_class() {
        assert!(is_write_operation("storage:delete"));
        assert!(is_write_operation("auth:signout"));
        assert!(!is_write_operation("storage:list"));
    }

    #[test]
    fn read_only_classification_depends_on_scopes() {
        assert!(is_mcp_read_only(&Credential::mcp("m1", McpAccessLevel::Readonly)));
        assert!(!is_mcp_read_only(&Credential::mcp("m2", McpAccessLevel::Readwrite)));

        let empty = Credential::new("m3", KeyType::Mcp, []);
        assert!(!is_mcp_read_only(&empty));

        let secret = Credential::new("s1", KeyType::Secret, [DbSelect]);
        assert!(!is_mcp_read_only(&secret));
    }
}
