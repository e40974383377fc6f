//! In-memory fake session used by the unit tests. Records every executed
//! statement and replays canned results in order.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::MapperError;
use crate::session::{CqlSession, CqlStatement, PreparedSpec};
use crate::tracer::QueryTrace;
use crate::types::ResultSet;

pub struct RecordingSession {
    pub executed: Mutex<Vec<CqlStatement>>,
    pub prepared: Mutex<Vec<String>>,
    canned_results: Mutex<Vec<ResultSet>>,
    canned_trace: Option<QueryTrace>,
    fail_execution: bool,
}

impl RecordingSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            executed: Mutex::new(Vec::new()),
            prepared: Mutex::new(Vec::new()),
            canned_results: Mutex::new(Vec::new()),
            canned_trace: Some(QueryTrace::default()),
            fail_execution: false,
        })
    }

    /// A session whose every execution fails with a database error.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            executed: Mutex::new(Vec::new()),
            prepared: Mutex::new(Vec::new()),
            canned_results: Mutex::new(Vec::new()),
            canned_trace: Some(QueryTrace::default()),
            fail_execution: true,
        })
    }

    /// A session whose trace fetches fail (the trace data "did not
    /// propagate yet").
    pub fn failing_traces() -> Arc<Self> {
        Arc::new(Self {
            executed: Mutex::new(Vec::new()),
            prepared: Mutex::new(Vec::new()),
            canned_results: Mutex::new(Vec::new()),
            canned_trace: None,
            fail_execution: false,
        })
    }

    /// Queue a result to return for the next execution; when the queue is
    /// empty an empty result set is returned.
    pub fn push_result(&self, result: ResultSet) {
        self.canned_results.lock().push(result);
    }

    pub fn executed_count(&self) -> usize {
        self.executed.lock().len()
    }
}

#[async_trait]
impl CqlSession for RecordingSession {
    async fn prepare(&self, query: &str) -> Result<Arc<PreparedSpec>, MapperError> {
        self.prepared.lock().push(query.to_string());
        Ok(Arc::new(PreparedSpec { id: Uuid::new_v4(), query: query.to_string() }))
    }

    async fn execute(&self, statement: &CqlStatement) -> Result<ResultSet, MapperError> {
        self.executed.lock().push(statement.clone());
        if self.fail_execution {
            return Err(MapperError::Database("injected failure".to_string()));
        }
        let mut canned = self.canned_results.lock();
        if canned.is_empty() {
            Ok(ResultSet::default())
        } else {
            Ok(canned.remove(0))
        }
    }

    async fn fetch_trace(&self, tracing_id: Uuid) -> Result<QueryTrace, MapperError> {
        match &self.canned_trace {
            Some(trace) => Ok(trace.clone()),
            None => Err(MapperError::Trace(format!(
                "trace {} not yet available from the coordinator",
                tracing_id
            ))),
        }
    }
}
