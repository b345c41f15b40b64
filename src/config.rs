//! Gateway configuration.
//!
//! Layers, lowest precedence first: built-in defaults, an optional file
//! (format picked from the extension), then `TENANTGATE__*` environment
//! variables with `__` separating nested keys.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use isolation_guards::validate_schema_name;
use request_trace::tracing::LogFormat;
use scope_enforcer::Credential;
use serde::{Deserialize, Serialize};
use tenant_resolver::parse_ttl;
use tenantgate_core_types::ProjectId;
use thiserror::Error;

pub const ENV_PREFIX: &str = "TENANTGATE";
pub const DEFAULT_BIND: &str = "127.0.0.1:8787";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub bind: SocketAddr,
    /// Humantime duration, e.g. `5m` or `90s`.
    pub tenant_cache_ttl: String,
    pub log: LogSettings,
    pub trace: TraceSettings,
    #[serde(default)]
    pub tenants: Vec<TenantSeed>,
    #[serde(default)]
    pub api_keys: Vec<ApiKeySeed>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceSettings {
    /// In-flight records older than this are pruned.
    pub stale_after: String,
}

/// Static project to schema assignment used by the in-memory tenant registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TenantSeed {
    pub project_id: ProjectId,
    pub schema: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiKeySeed {
    #[serde(skip_serializing)]
    pub key: String,
    pub project_id: ProjectId,
    pub credential: Credential,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.parse().unwrap_or_else(|_| {
                SocketAddr::from(([127, 0, 0, 1], 8787))
            }),
            tenant_cache_ttl: "5m".into(),
            log: LogSettings {
                level: "info".into(),
                format: LogFormat::Text,
            },
            trace: TraceSettings {
                stale_after: "10m".into(),
            },
            tenants: Vec::new(),
            api_keys: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Loads and validates the layered configuration.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("bind", DEFAULT_BIND)?
            .set_default("tenant_cache_ttl", "5m")?
            .set_default("log.level", "info")?
            .set_default("log.format", "text")?
            .set_default("trace.stale_after", "10m")?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let loaded: GatewayConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tenant_cache_ttl()?;
        self.trace_stale_after()?;

        let mut projects = HashSet::new();
        for tenant in &self.tenants {
            if !projects.insert(tenant.project_id) {
                return Err(ConfigError::Invalid(format!(
                    "tenant {} is declared twice",
                    tenant.project_id
                )));
            }
            validate_schema_name(&tenant.schema).map_err(|err| {
                ConfigError::Invalid(format!("tenant {}: {err}", tenant.project_id))
            })?;
        }

        let mut keys = HashSet::new();
        let mut credential_ids = HashSet::new();
        for seed in &self.api_keys {
            if seed.key.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "credential {} has an empty key",
                    seed.credential.id
                )));
            }
            if !keys.insert(seed.key.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "credential {} reuses another credential's key",
                    seed.credential.id
                )));
            }
            if !credential_ids.insert(seed.credential.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "credential id {} is declared twice",
                    seed.credential.id
                )));
            }
            seed.credential.validate().map_err(ConfigError::Invalid)?;
        }
        Ok(())
    }

    pub fn tenant_cache_ttl(&self) -> Result<Duration, ConfigError> {
        parse_ttl(&self.tenant_cache_ttl)
            .map_err(|err| ConfigError::Invalid(format!("tenant_cache_ttl: {err}")))
    }

    pub fn trace_stale_after(&self) -> Result<Duration, ConfigError> {
        humantime::parse_duration(self.trace.stale_after.trim())
            .map_err(|err| ConfigError::Invalid(format!("trace.stale_after: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scope_enforcer::{KeyType, McpAccessLevel};
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::tempdir;

    const PID: &str = "11111111-1111-1111-1111-111111111111";

    fn clear_env() {
        for (key, _) in env::vars() {
            if key.starts_with("TENANTGATE__") {
                env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn defaults_apply_without_sources() {
        clear_env();
        let config = GatewayConfig::load(None).unwrap();
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.tenant_cache_ttl().unwrap(), Duration::from_secs(300));
        assert_eq!(config.trace_stale_after().unwrap(), Duration::from_secs(600));
        assert_eq!(config.log.format, LogFormat::Text);
        assert!(config.tenants.is_empty());
    }

    #[test]
    #[serial]
    fn file_seeds_tenants_and_keys() {
        clear_env();
        let dir = tempdir().unwrap();
        let path = dir.path().join("tenantgate.yaml");
        fs::write(
            &path,
            format!(
                r#"
bind: "0.0.0.0:9000"
tenant_cache_ttl: 90s
log:
  level: debug
  format: json
tenants:
  - project_id: "{PID}"
    schema: tenant_foo
api_keys:
  - key: mcp_ro_key
    project_id: "{PID}"
    credential:
      id: key_ro
      key_type: mcp
      mcp_access_level: readonly
      scopes: ["db:select", "storage:read", "realtime:subscribe"]
"#
            ),
        )
        .unwrap();

        let config = GatewayConfig::load(Some(&path)).unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.tenant_cache_ttl().unwrap(), Duration::from_secs(90));
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.tenants[0].schema, "tenant_foo");
        let seed = &config.api_keys[0];
        assert_eq!(seed.credential.key_type, KeyType::Mcp);
        assert_eq!(
            seed.credential.mcp_access_level,
            Some(McpAccessLevel::Readonly)
        );
    }

    #[test]
    #[serial]
    fn environment_overrides_the_file() {
        clear_env();
        let dir = tempdir().unwrap();
        let path = dir.path().join("tenantgate.yaml");
        fs::write(&path, "tenant_cache_ttl: 1m\nlog:\n  level: warn\n").unwrap();

        env::set_var("TENANTGATE__TENANT_CACHE_TTL", "30s");
        env::set_var("TENANTGATE__LOG__LEVEL", "trace");
        let config = GatewayConfig::load(Some(&path));
        clear_env();

        let config = config.unwrap();
        assert_eq!(config.tenant_cache_ttl().unwrap(), Duration::from_secs(30));
        assert_eq!(config.log.level, "trace");
    }

    #[test]
    #[serial]
    fn invalid_values_are_rejected() {
        clear_env();
        let dir = tempdir().unwrap();

        let bad_ttl = dir.path().join("ttl.yaml");
        fs::write(&bad_ttl, "tenant_cache_ttl: soon\n").unwrap();
        assert!(matches!(
            GatewayConfig::load(Some(&bad_ttl)),
            Err(ConfigError::Invalid(_))
        ));

        let bad_schema = dir.path().join("schema.yaml");
        fs::write(
            &bad_schema,
            format!("tenants:\n  - project_id: \"{PID}\"\n    schema: public\n"),
        )
        .unwrap();
        assert!(matches!(
            GatewayConfig::load(Some(&bad_schema)),
            Err(ConfigError::Invalid(_))
        ));

        let bad_mcp = dir.path().join("mcp.yaml");
        fs::write(
            &bad_mcp,
            format!(
                "api_keys:\n  - key: k\n    project_id: \"{PID}\"\n    credential:\n      id: c1\n      key_type: mcp\n"
            ),
        )
        .unwrap();
        assert!(matches!(
            GatewayConfig::load(Some(&bad_mcp)),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    #[serial]
    fn missing_file_is_an_error() {
        clear_env();
        let dir = tempdir().unwrap();
        let err = GatewayConfig::load(Some(&dir.path().join("absent.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn serialized_config_never_contains_keys() {
        let mut config = GatewayConfig::default();
        config.api_keys.push(ApiKeySeed {
            key: "super-secret".into(),
            project_id: PID.parse().unwrap(),
            credential: Credential::mcp("key_1", McpAccessLevel::Admin),
        });
        let rendered = serde_yaml::to_string(&config).unwrap();
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("key_1"));
    }
}
