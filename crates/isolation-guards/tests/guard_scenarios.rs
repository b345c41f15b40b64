use std::sync::Arc;

use async_trait::async_trait;
use isolation_guards::{
    assert_path, assert_query_isolation, assert_subscription, build_channel, build_path,
    BackendError, ChannelType, ConnectionPool, PooledConnection, ScopedConnection,
};
use std::sync::Mutex;
use tenantgate_core_types::{GateError, ProjectId};

const PID: &str = "11111111-1111-1111-1111-111111111111";

fn pid() -> ProjectId {
    ProjectId::parse(PID).unwrap()
}

#[test]
fn table_channel_round_trip_and_cross_project_denial() {
    let channel = build_channel(&pid(), ChannelType::Table, Some("users")).unwrap();
    assert_eq!(channel, "11111111-1111-1111-1111-111111111111:table:users");

    let parsed = assert_subscription(&channel, Some(&pid())).unwrap();
    assert_eq!(parsed.channel_type, ChannelType::Table);
    assert_eq!(parsed.identifier.as_deref(), Some("users"));

    let other = ProjectId::parse("22222222-2222-2222-2222-222222222222").unwrap();
    let err = assert_subscription(&channel, Some(&other)).unwrap_err();
    assert_eq!(err, GateError::CrossProjectChannel);
    assert_eq!(err.http_status(), 403);
    assert!(!err.to_string().contains(PID));
}

#[test]
fn storage_path_round_trip_and_traversal() {
    let scoped = build_path(&pid(), "/uploads/avatar.png").unwrap();
    assert_eq!(scoped, format!("{PID}:/uploads/avatar.png"));
    assert_eq!(assert_path(&scoped, Some(&pid())).unwrap().path, "/uploads/avatar.png");

    assert_eq!(
        build_path(&pid(), "../etc/passwd").unwrap_err(),
        GateError::PathTraversalDetected
    );

    let other = ProjectId::new_random();
    assert_eq!(
        assert_path(&scoped, Some(&other)).unwrap_err(),
        GateError::CrossProjectPath
    );
}

#[test]
fn traversal_is_rejected_before_ownership() {
    let foreign = format!("{}:/a/../../b", ProjectId::new_random());
    assert_eq!(
        assert_path(&foreign, Some(&pid())).unwrap_err(),
        GateError::PathTraversalDetected
    );
}

#[test]
fn schema_isolation_scenarios() {
    assert!(assert_query_isolation("SELECT * FROM tenant_foo.users", "tenant_foo").is_ok());
    assert_eq!(
        assert_query_isolation("SELECT * FROM tenant_bar.users", "tenant_foo").unwrap_err(),
        GateError::CrossSchemaAccess
    );
    assert!(assert_query_isolation("SELECT * FROM public.migrations", "tenant_foo").is_ok());
}

#[derive(Default)]
struct RecordingPool {
    executed: Arc<Mutex<Vec<String>>>,
    fail_search_path: bool,
}

struct RecordingConnection {
    executed: Arc<Mutex<Vec<String>>>,
    fail_search_path: bool,
}

#[async_trait]
impl PooledConnection for RecordingConnection {
    async fn execute(&mut self, statement: &str) -> Result<u64, BackendError> {
        if self.fail_search_path && statement.starts_with("SET search_path") {
            return Err(BackendError::Statement("schema does not exist".into()));
        }
        self.executed.lock().unwrap().push(statement.to_string());
        Ok(1)
    }
}

#[async_trait]
impl ConnectionPool for RecordingPool {
    async fn checkout(&self) -> Result<Box<dyn PooledConnection>, BackendError> {
        Ok(Box::new(RecordingConnection {
            executed: Arc::clone(&self.executed),
            fail_search_path: self.fail_search_path,
        }))
    }
}

#[tokio::test]
async fn scoped_connection_sets_search_path_first() {
    let pool = RecordingPool::default();
    let mut conn = ScopedConnection::checkout(&pool, "tenant_foo").await.unwrap();
    conn.execute("SELECT * FROM users").await.unwrap();

    let executed = pool.executed.lock().unwrap().clone();
    assert_eq!(
        executed,
        vec![
            "SET search_path TO \"tenant_foo\"".to_string(),
            "SELECT * FROM users".to_string()
        ]
    );
}

#[tokio::test]
async fn rejected_statements_never_reach_the_database() {
    let pool = RecordingPool::default();
    let mut conn = ScopedConnection::checkout(&pool, "tenant_foo").await.unwrap();

    for sql in [
        "SELECT * FROM tenant_bar.users",
        "SET search_path TO tenant_bar",
        "SELECT set_config('search_path', 'tenant_bar', false)",
    ] {
        assert_eq!(
            conn.execute(sql).await.unwrap_err(),
            GateError::CrossSchemaAccess
        );
    }
    assert_eq!(pool.executed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn one_request_cannot_repoint_search_path_and_read() {
    let pool = RecordingPool::default();
    let mut conn = ScopedConnection::checkout(&pool, "tenant_foo").await.unwrap();

    for sql in [
        r#"SET "search_path" TO tenant_bar; SELECT * FROM secrets"#,
        "SET/**/search_path TO tenant_bar; SELECT * FROM secrets",
        "SELECT set_config('search' || '_path', 'tenant_bar', false); SELECT * FROM secrets",
        "SELECT 1; SELECT * FROM secrets",
    ] {
        assert_eq!(
            conn.execute(sql).await.unwrap_err(),
            GateError::MultipleStatements,
            "{sql}"
        );
    }
    for sql in [
        r#"SET "search_path" TO tenant_bar"#,
        "SET/**/search_path TO tenant_bar",
        "SELECT set_config('search' || '_path', 'tenant_bar', false)",
    ] {
        assert_eq!(
            conn.execute(sql).await.unwrap_err(),
            GateError::CrossSchemaAccess,
            "{sql}"
        );
    }
    assert_eq!(pool.executed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn search_path_failure_is_schema_init_failed() {
    let pool = RecordingPool {
        fail_search_path: true,
        ..Default::default()
    };
    let err = ScopedConnection::checkout(&pool, "tenant_missing")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SCHEMA_INIT_FAILED");
    assert_eq!(err.http_status(), 500);
    assert!(!err.public_message().contains("does not exist"));
}
