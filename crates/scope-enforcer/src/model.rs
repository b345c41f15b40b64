//! Credential and capability vocabulary.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// One `service:action` permission atom. The vocabulary is closed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum CapabilityScope {
    DbSelect,
    DbInsert,
    DbUpdate,
    DbDelete,
    StorageRead,
    StorageWrite,
    AuthSignin,
    AuthSignup,
    AuthManage,
    RealtimeSubscribe,
    RealtimePublish,
    GraphqlExecute,
}

impl CapabilityScope {
    pub const ALL: [CapabilityScope; 12] = [
        CapabilityScope::DbSelect,
        CapabilityScope::DbInsert,
        CapabilityScope::DbUpdate,
        CapabilityScope::DbDelete,
        CapabilityScope::StorageRead,
        CapabilityScope::StorageWrite,
        CapabilityScope::AuthSignin,
        CapabilityScope::AuthSignup,
        CapabilityScope::AuthManage,
        CapabilityScope::RealtimeSubscribe,
        CapabilityScope::RealtimePublish,
        CapabilityScope::GraphqlExecute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityScope::DbSelect => "db:select",
            CapabilityScope::DbInsert => "db:insert",
            CapabilityScope::DbUpdate => "db:update",
            CapabilityScope::DbDelete => "db:delete",
            CapabilityScope::StorageRead => "storage:read",
            CapabilityScope::StorageWrite => "storage:write",
            CapabilityScope::AuthSignin => "auth:signin",
            CapabilityScope::AuthSignup => "auth:signup",
            CapabilityScope::AuthManage => "auth:manage",
            CapabilityScope::RealtimeSubscribe => "realtime:subscribe",
            CapabilityScope::RealtimePublish => "realtime:publish",
            CapabilityScope::GraphqlExecute => "graphql:execute",
        }
    }

    /// The `service` half of the atom, e.g. `db` for `db:select`.
    pub fn service(&self) -> &'static str {
        let raw = self.as_str();
        raw.split_once(':').map(|(service, _)| service).unwrap_or(raw)
    }

    /// Scopes that mutate state or act on behalf of users.
    pub fn is_write_class(&self) -> bool {
        !matches!(
            self,
            CapabilityScope::DbSelect
                | CapabilityScope::StorageRead
                | CapabilityScope::RealtimeSubscribe
        )
    }
}

impl fmt::Display for CapabilityScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown capability scope: {0}")]
pub struct UnknownScope(pub String);

impl FromStr for CapabilityScope {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CapabilityScope::ALL
            .iter()
            .copied()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| UnknownScope(s.to_string()))
    }
}

impl Serialize for CapabilityScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CapabilityScope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Public,
    Secret,
    ServiceRole,
    Mcp,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Public => "public",
            KeyType::Secret => "secret",
            KeyType::ServiceRole => "service_role",
            KeyType::Mcp => "mcp",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tier of an MCP token issued to an AI or IDE agent.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpAccessLevel {
    Readonly,
    Readwrite,
    Admin,
}

impl McpAccessLevel {
    /// Scopes issued to a fresh token of this tier.
    pub fn default_scopes(&self) -> BTreeSet<CapabilityScope> {
        use CapabilityScope::*;
        match self {
            McpAccessLevel::Readonly => [DbSelect, StorageRead, RealtimeSubscribe]
                .into_iter()
                .collect(),
            McpAccessLevel::Readwrite => [
                DbSelect,
                DbInsert,
                DbUpdate,
                DbDelete,
                StorageRead,
                StorageWrite,
                RealtimeSubscribe,
                RealtimePublish,
            ]
            .into_iter()
            .collect(),
            McpAccessLevel::Admin => CapabilityScope::ALL.into_iter().collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEnvironment {
    #[default]
    Live,
    Test,
    Dev,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    #[default]
    Active,
    Rotated,
    Revoked,
    Expired,
}

/// An issued API key as seen by the enforcement layer. Verification happens upstream.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub key_type: KeyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_access_level: Option<McpAccessLevel>,
    #[serde(default)]
    pub scopes: BTreeSet<CapabilityScope>,
    #[serde(default)]
    pub environment: KeyEnvironment,
    #[serde(default)]
    pub status: KeyStatus,
}

impl Credential {
    pub fn new(
        id: impl Into<String>,
        key_type: KeyType,
        scopes: impl IntoIterator<Item = CapabilityScope>,
    ) -> Self {
        Self {
            id: id.into(),
            key_type,
            mcp_access_level: None,
            scopes: scopes.into_iter().collect(),
            environment: KeyEnvironment::default(),
            status: KeyStatus::default(),
        }
    }

    /// MCP token carrying the default scopes of `level`.
    pub fn mcp(id: impl Into<String>, level: McpAccessLevel) -> Self {
        Self {
            id: id.into(),
            key_type: KeyType::Mcp,
            mcp_access_level: Some(level),
            scopes: level.default_scopes(),
            environment: KeyEnvironment::default(),
            status: KeyStatus::default(),
        }
    }

    pub fn has_scope(&self, scope: CapabilityScope) -> bool {
        self.scopes.contains(&scope)
    }

    pub fn is_active(&self) -> bool {
        self.status == KeyStatus::Active
    }

    /// An MCP tier is present exactly when the key is an MCP token.
    pub fn validate(&self) -> Result<(), String> {
        match (self.key_type, self.mcp_access_level) {
            (KeyType::Mcp, None) => Err(format!(
                "credential {} is an mcp token without an access level",
                self.id
            )),
            (KeyType::Mcp, Some(_)) => Ok(()),
            (other, Some(_)) => Err(format!(
                "credential {} has an mcp access level but key type {other}",
                self.id
            )),
            (_, None) => Ok(()),
        }
    }
}
