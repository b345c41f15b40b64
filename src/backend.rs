//! In-process database backend.
//!
//! Stands in for a real Postgres pool in local runs and tests: statements are
//! recorded per connection instead of executed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use isolation_guards::{BackendError, ConnectionPool, PooledConnection};
use parking_lot::Mutex;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutedStatement {
    pub connection: u64,
    pub statement: String,
}

#[derive(Default)]
pub struct RecordingPool {
    executed: Arc<Mutex<Vec<ExecutedStatement>>>,
    next_connection: AtomicU64,
}

impl RecordingPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.executed.lock().clone()
    }

    pub fn checkouts(&self) -> u64 {
        self.next_connection.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionPool for RecordingPool {
    async fn checkout(&self) -> Result<Box<dyn PooledConnection>, BackendError> {
        let connection = self.next_connection.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(RecordingConnection {
            connection,
            executed: Arc::clone(&self.executed),
        }))
    }
}

struct RecordingConnection {
    connection: u64,
    executed: Arc<Mutex<Vec<ExecutedStatement>>>,
}

#[async_trait]
impl PooledConnection for RecordingConnection {
    async fn execute(&mut self, statement: &str) -> Result<u64, BackendError> {
        debug!(connection = self.connection, "statement recorded");
        self.executed.lock().push(ExecutedStatement {
            connection: self.connection,
            statement: statement.to_string(),
        });
        Ok(0)
    }
}
