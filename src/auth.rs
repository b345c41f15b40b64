//! API key authentication at the gateway edge.
//!
//! Key verification proper (hashing, rotation) lives with the key issuer. The
//! gateway only needs to map a presented key to its credential and project.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use dashmap::DashMap;
use scope_enforcer::{Credential, KeyStatus};
use tenantgate_core_types::{GateError, GateResult, ProjectId};
use tracing::debug;

use crate::config::ApiKeySeed;

pub const API_KEY_HEADER: &str = "apikey";

/// The authenticated caller attached to every request past the auth layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub credential: Credential,
    pub project_id: ProjectId,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, api_key: &str) -> GateResult<Principal>;
}

/// Keys loaded from configuration. Unknown and non-active keys are both `KEY_INVALID`.
#[derive(Default)]
pub struct StaticKeyAuthenticator {
    keys: DashMap<String, Principal>,
}

impl StaticKeyAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seeds<'a>(seeds: impl IntoIterator<Item = &'a ApiKeySeed>) -> Self {
        let authenticator = Self::new();
        for seed in seeds {
            authenticator.insert(seed.key.clone(), seed.credential.clone(), seed.project_id);
        }
        authenticator
    }

    pub fn insert(&self, key: impl Into<String>, credential: Credential, project_id: ProjectId) {
        self.keys.insert(
            key.into(),
            Principal {
                credential,
                project_id,
            },
        );
    }

    /// Marks the key's credential revoked. Returns false for unknown keys.
    pub fn revoke(&self, key: &str) -> bool {
        match self.keys.get_mut(key) {
            Some(mut entry) => {
                entry.credential.status = KeyStatus::Revoked;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticKeyAuthenticator {
    async fn authenticate(&self, api_key: &str) -> GateResult<Principal> {
        let principal = self
            .keys
            .get(api_key)
            .map(|entry| entry.value().clone())
            .ok_or(GateError::KeyInvalid)?;
        if !principal.credential.is_active() {
            debug!(
                credential_id = %principal.credential.id,
                status = ?principal.credential.status,
                "inactive credential presented"
            );
            return Err(GateError::KeyInvalid);
        }
        Ok(principal)
    }
}

/// Reads the key from `apikey`, falling back to `Authorization: Bearer`.
pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(API_KEY_HEADER) {
        if let Ok(raw) = value.to_str() {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }

    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(raw) = value.to_str() {
            if let Some(token) = raw.strip_prefix("Bearer ") {
                let trimmed = token.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use scope_enforcer::McpAccessLevel;

    #[tokio::test]
    async fn active_keys_resolve_to_their_project() {
        let project = ProjectId::new_random();
        let auth = StaticKeyAuthenticator::new();
        auth.insert("k1", Credential::mcp("key_1", McpAccessLevel::Readwrite), project);

        let principal = auth.authenticate("k1").await.unwrap();
        assert_eq!(principal.project_id, project);
        assert_eq!(auth.authenticate("k2").await.unwrap_err(), GateError::KeyInvalid);
    }

    #[tokio::test]
    async fn revoked_keys_are_invalid() {
        let auth = StaticKeyAuthenticator::new();
        auth.insert(
            "k1",
            Credential::mcp("key_1", McpAccessLevel::Admin),
            ProjectId::new_random(),
        );
        assert!(auth.revoke("k1"));
        assert!(!auth.revoke("missing"));
        assert_eq!(auth.authenticate("k1").await.unwrap_err(), GateError::KeyInvalid);
    }

    #[test]
    fn key_extraction_prefers_apikey_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_api_key(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer  tok "));
        assert_eq!(extract_api_key(&headers).as_deref(), Some("tok"));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("direct"));
        assert_eq!(extract_api_key(&headers).as_deref(), Some("direct"));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("   "));
        assert_eq!(extract_api_key(&headers).as_deref(), Some("tok"));

        headers.remove(API_KEY_HEADER);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_api_key(&headers), None);
    }
}
