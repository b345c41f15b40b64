//! Connections pinned to one tenant schema.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tenantgate_core_types::{GateError, GateResult};
use thiserror::Error;
use tracing::{debug, warn};

use crate::schema::{
    assert_query_isolation, assert_single_statement, changes_search_path, is_system_schema,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("connection pool unavailable: {0}")]
    Unavailable(String),
    #[error("statement failed: {0}")]
    Statement(String),
}

/// One checked-out database connection. Dropping it releases it to the pool.
#[async_trait]
pub trait PooledConnection: Send {
    /// Runs a raw statement and returns the affected row count.
    async fn execute(&mut self, statement: &str) -> Result<u64, BackendError>;
}

#[async_trait]
pub trait ConnectionPool: Send + Sync {
    async fn checkout(&self) -> Result<Box<dyn PooledConnection>, BackendError>;
}

static SCHEMA_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("schema pattern compiles"));

/// Tenant schemas must be plain identifiers and may not be a shared system schema.
pub fn validate_schema_name(schema: &str) -> GateResult<()> {
    if !SCHEMA_IDENT.is_match(schema) || is_system_schema(&schema.to_ascii_lowercase()) {
        return Err(GateError::SchemaInitFailed(format!(
            "invalid tenant schema identifier: {schema}"
        )));
    }
    Ok(())
}

pub fn search_path_statement(schema: &str) -> String {
    format!("SET search_path TO \"{}\"", schema.replace('"', "\"\""))
}

/// Rejects statements that would move the connection off its tenant schema:
/// `SET [SESSION|LOCAL] search_path`, `SET SCHEMA`, `RESET`, `DISCARD`, and any
/// `set_config` call whose first argument is not a literal naming another setting.
pub fn assert_search_path_untouched(statement: &str) -> GateResult<()> {
    if changes_search_path(statement) {
        warn!(target: "isolation-guards", "statement attempts to change search_path");
        return Err(GateError::CrossSchemaAccess);
    }
    Ok(())
}

/// A pooled connection whose `search_path` is pinned to one tenant schema.
///
/// Every statement must be a single statement and pass the search path check
/// and [`assert_query_isolation`] before it reaches the database.
pub struct ScopedConnection {
    conn: Box<dyn PooledConnection>,
    schema: String,
}

impl std::fmt::Debug for ScopedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedConnection")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl ScopedConnection {
    pub async fn checkout(pool: &dyn ConnectionPool, schema: &str) -> GateResult<Self> {
        validate_schema_name(schema)?;
        let mut conn = pool.checkout().await.map_err(|err| {
            warn!(target: "isolation-guards", error = %err, "connection checkout failed");
            GateError::Upstream(err.to_string())
        })?;
        conn.execute(&search_path_statement(schema))
            .await
            .map_err(|err| {
                warn!(target: "isolation-guards", schema, error = %err, "setting search_path failed");
                GateError::SchemaInitFailed(err.to_string())
            })?;
        debug!(target: "isolation-guards", schema, "connection scoped");
        Ok(Self {
            conn,
            schema: schema.to_string(),
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub async fn execute(&mut self, statement: &str) -> GateResult<u64> {
        assert_single_statement(statement)?;
        assert_search_path_untouched(statement)?;
        assert_query_isolation(statement, &self.schema)?;
        self.conn
            .execute(statement)
            .await
            .map_err(|err| GateError::Upstream(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_names_are_plain_identifiers() {
        assert!(validate_schema_name("tenant_foo").is_ok());
        assert!(validate_schema_name("_t1").is_ok());
        let long = "x".repeat(64);
        for bad in ["", "1tenant", "tenant-foo", "a\"b", "public", "PG_CATALOG", long.as_str()] {
            assert_eq!(
                validate_schema_name(bad).unwrap_err().code(),
                "SCHEMA_INIT_FAILED",
                "{bad}"
            );
        }
    }

    #[test]
    fn search_path_statement_quotes_the_schema() {
        assert_eq!(
            search_path_statement("tenant_foo"),
            "SET search_path TO \"tenant_foo\""
        );
    }

    #[test]
    fn search_path_changes_are_denied() {
        for sql in [
            "SET search_path TO tenant_bar",
            "set local search_path = tenant_bar",
            "SELECT set_config('search_path', 'tenant_bar', false)",
            "SELECT pg_catalog.set_config( 'search_path', 'x', true)",
            "RESET search_path",
            "reset all",
            r#"SET "search_path" TO tenant_bar"#,
            "SET/**/search_path TO tenant_bar",
            "SELECT set_config('search' || '_path', 'tenant_bar', false)",
        ] {
            assert_eq!(
                assert_search_path_untouched(sql).unwrap_err(),
                GateError::CrossSchemaAccess,
                "{sql}"
            );
        }
        assert!(assert_search_path_untouched("SELECT search_path_hint FROM t").is_ok());
    }
}
