//! Session abstraction and the driver-facing statement model.
//!
//! The execution core never talks to a concrete driver directly; everything
//! goes through [`CqlSession`]. The scylla-backed implementation lives in
//! [`scylla`](self::scylla).

pub mod scylla;

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::MapperError;
use crate::retry::RetryPolicySpec;
use crate::tracer::QueryTrace;
use crate::types::{BatchKind, ColumnValue, ConsistencyLevel, ResultSet};

/// Handle for a statement prepared on a session. The id addresses the
/// driver-side prepared statement; the text is kept for logging and LWT
/// inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSpec {
    pub id: Uuid,
    pub query: String,
}

/// An ad-hoc statement with positional values and per-statement options.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimpleStatement {
    pub query: String,
    pub values: Vec<ColumnValue>,
    pub consistency: Option<ConsistencyLevel>,
    pub serial_consistency: Option<ConsistencyLevel>,
    pub tracing: bool,
    pub page_size: Option<i32>,
    pub keyspace: Option<String>,
    pub routing_key: Option<Vec<u8>>,
    pub idempotent: bool,
    pub retry_policy: Option<RetryPolicySpec>,
}

impl SimpleStatement {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Default::default() }
    }

    pub fn with_values(mut self, values: Vec<ColumnValue>) -> Self {
        self.values = values;
        self
    }
}

/// A prepared statement bound with positional values.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub prepared: Arc<PreparedSpec>,
    pub values: Vec<ColumnValue>,
    pub consistency: Option<ConsistencyLevel>,
    pub serial_consistency: Option<ConsistencyLevel>,
    pub tracing: bool,
    pub page_size: Option<i32>,
}

/// A batch of non-batch statements applied together by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStatement {
    pub kind: BatchKind,
    pub statements: Vec<CqlStatement>,
    pub consistency: Option<ConsistencyLevel>,
    pub tracing: bool,
}

/// The thing a session actually executes.
#[derive(Debug, Clone, PartialEq)]
pub enum CqlStatement {
    Simple(SimpleStatement),
    Prepared(BoundStatement),
    Batch(BatchStatement),
}

impl CqlStatement {
    pub fn query_string(&self) -> String {
        match self {
            CqlStatement::Simple(s) => s.query.clone(),
            CqlStatement::Prepared(b) => b.prepared.query.clone(),
            CqlStatement::Batch(b) => {
                let kind = match b.kind {
                    BatchKind::Logged => "",
                    BatchKind::Unlogged => "UNLOGGED ",
                    BatchKind::Counter => "COUNTER ",
                };
                let mut text = format!("BEGIN {}BATCH\n", kind);
                for child in &b.statements {
                    text.push_str(&format!("  {};\n", child.query_string()));
                }
                text.push_str("APPLY BATCH;");
                text
            }
        }
    }

    pub fn values(&self) -> &[ColumnValue] {
        match self {
            CqlStatement::Simple(s) => &s.values,
            CqlStatement::Prepared(b) => &b.values,
            CqlStatement::Batch(_) => &[],
        }
    }

    pub fn consistency(&self) -> Option<ConsistencyLevel> {
        match self {
            CqlStatement::Simple(s) => s.consistency,
            CqlStatement::Prepared(b) => b.consistency,
            CqlStatement::Batch(b) => b.consistency,
        }
    }

    pub fn tracing(&self) -> bool {
        match self {
            CqlStatement::Simple(s) => s.tracing,
            CqlStatement::Prepared(b) => b.tracing,
            CqlStatement::Batch(b) => b.tracing,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            CqlStatement::Simple(_) => "simple",
            CqlStatement::Prepared(_) => "prepared",
            CqlStatement::Batch(_) => "batch",
        }
    }
}

/// An already-connected database session. Implementations execute statements
/// asynchronously and expose server-side tracing data; connection pooling,
/// node discovery, and retries all live behind this boundary.
#[async_trait]
pub trait CqlSession: Send + Sync {
    async fn prepare(&self, query: &str) -> Result<Arc<PreparedSpec>, MapperError>;

    async fn execute(&self, statement: &CqlStatement) -> Result<ResultSet, MapperError>;

    async fn fetch_trace(&self, tracing_id: Uuid) -> Result<QueryTrace, MapperError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_query_string_rendering() {
        let batch = CqlStatement::Batch(BatchStatement {
            kind: BatchKind::Unlogged,
            statements: vec![
                CqlStatement::Simple(SimpleStatement::new("INSERT INTO ks.t (a) VALUES (?)")),
                CqlStatement::Simple(SimpleStatement::new("UPDATE ks.t SET a = ? WHERE b = ?")),
            ],
            consistency: None,
            tracing: false,
        });
        let text = batch.query_string();
        assert!(text.starts_with("BEGIN UNLOGGED BATCH"));
        assert!(text.contains("INSERT INTO ks.t (a) VALUES (?);"));
        assert!(text.ends_with("APPLY BATCH;"));
    }

    #[test]
    fn test_statement_accessors() {
        let stmt = CqlStatement::Simple(
            SimpleStatement::new("SELECT * FROM ks.t WHERE id = ?")
                .with_values(vec![ColumnValue::BigInt(1)]),
        );
        assert_eq!(stmt.values().len(), 1);
        assert_eq!(stmt.kind_label(), "simple");
        assert!(!stmt.tracing());
    }
}
