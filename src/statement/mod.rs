//! The four statement shapes the execution core sends to a session, behind
//! one contract: query-string extraction, bound values, consistency
//! assignment, DML logging, tracing activation and LWT inspection.
//!
//! Shared logging, metrics and the trace continuation live here as free
//! functions; the variants stay flat instead of forming a hierarchy.

pub mod batch;
pub mod bound;
pub mod native;
pub mod regular;

use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::config::DmlLogConfig;
use crate::errors::MapperError;
use crate::lwt::{self, LwtListener, LwtStatus};
use crate::metrics;
use crate::session::{CqlSession, CqlStatement};
use crate::tracer::QueryTracer;
use crate::types::{ColumnValue, ConsistencyLevel, ResultSet};

pub use batch::BatchStatementWrapper;
pub use bound::BoundStatementWrapper;
pub use native::NativeStatementWrapper;
pub use regular::RegularStatementWrapper;

/// Polymorphic envelope over the statement shapes.
#[derive(Debug)]
pub enum StatementWrapper {
    Bound(BoundStatementWrapper),
    Regular(RegularStatementWrapper),
    Native(NativeStatementWrapper),
    Batch(BatchStatementWrapper),
}

impl StatementWrapper {
    pub fn query_string(&self) -> String {
        match self {
            StatementWrapper::Bound(w) => w.query_string().to_string(),
            StatementWrapper::Regular(w) => w.query_string().to_string(),
            StatementWrapper::Native(w) => w.query_string(),
            StatementWrapper::Batch(w) => w.query_string(),
        }
    }

    pub fn bound_values(&self) -> Vec<ColumnValue> {
        match self {
            StatementWrapper::Bound(w) => w.bound_values().to_vec(),
            StatementWrapper::Regular(w) => w.bound_values().to_vec(),
            StatementWrapper::Native(w) => w.bound_values().to_vec(),
            StatementWrapper::Batch(_) => Vec::new(),
        }
    }

    /// The statement the session actually executes.
    pub fn statement(&self) -> Result<Arc<CqlStatement>, MapperError> {
        match self {
            StatementWrapper::Bound(w) => w.statement(),
            StatementWrapper::Regular(w) => Ok(w.statement()),
            StatementWrapper::Native(w) => Ok(w.statement()),
            StatementWrapper::Batch(w) => w.statement(),
        }
    }

    pub fn lwt_listener(&self) -> Option<Arc<dyn LwtListener>> {
        match self {
            StatementWrapper::Bound(w) => w.lwt_listener(),
            StatementWrapper::Regular(w) => w.lwt_listener(),
            StatementWrapper::Native(w) => w.lwt_listener(),
            StatementWrapper::Batch(w) => w.lwt_listener(),
        }
    }

    /// True for counter mutations; such statements may only join COUNTER
    /// batches.
    pub fn is_counter(&self) -> bool {
        match self {
            StatementWrapper::Bound(w) => w.is_counter(),
            StatementWrapper::Regular(w) => w.is_counter(),
            StatementWrapper::Native(w) => w.is_counter(),
            StatementWrapper::Batch(w) => w.kind() == crate::types::BatchKind::Counter,
        }
    }

    pub fn log_statement(&self) {
        match self {
            StatementWrapper::Bound(w) => {
                log_dml(w.log_config(), w.query_string(), w.consistency(), w.bound_values())
            }
            StatementWrapper::Regular(w) => {
                log_dml(w.log_config(), w.query_string(), w.consistency(), w.bound_values())
            }
            StatementWrapper::Native(w) => {
                log_dml(w.log_config(), &w.query_string(), w.consistency(), w.bound_values())
            }
            StatementWrapper::Batch(w) => w.log_statement(),
        }
    }

    /// Routes a conditional result to the wrapper's listener, or raises when
    /// the write did not apply and nobody is listening. A no-op for
    /// non-conditional statements.
    pub fn check_lwt(&self, result: &ResultSet) -> Result<LwtStatus, MapperError> {
        let listener = self.lwt_listener();
        let query = match self {
            StatementWrapper::Batch(w) => match w.conditional_query() {
                Some(query) => query,
                None => return Ok(LwtStatus::NotConditional),
            },
            other => other.query_string(),
        };
        lwt::check(&query, listener.as_ref(), result)
    }

    /// Dispatches the statement asynchronously: DML log, execute, metrics,
    /// spawned trace continuation, LWT inspection. Driver errors propagate
    /// opaquely; no retry happens at this layer.
    pub async fn execute(&self, session: &Arc<dyn CqlSession>) -> Result<ResultSet, MapperError> {
        self.log_statement();
        let statement = self.statement()?;
        let start = Instant::now();
        let outcome = session.execute(&statement).await;
        metrics::record_statement(
            statement.kind_label(),
            outcome.is_ok(),
            start.elapsed().as_secs_f64(),
        );
        let result = outcome?;
        if statement.tracing() {
            if let Some(tracing_id) = result.tracing_id {
                spawn_trace_report(session.clone(), statement.query_string(), tracing_id);
            }
        }
        self.check_lwt(&result)?;
        Ok(result)
    }
}

/// DML logging hook, gated by the explicit config every wrapper carries.
pub(crate) fn log_dml(
    config: &DmlLogConfig,
    query: &str,
    consistency: Option<ConsistencyLevel>,
    values: &[ColumnValue],
) {
    if !config.debug_enabled {
        return;
    }
    let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    let level = consistency
        .map(|cl| cl.to_string())
        .unwrap_or_else(|| "DEFAULT".to_string());
    debug!(
        logger = %config.logger_name,
        consistency = %level,
        values = %rendered.join(", "),
        "DML: {}",
        query
    );
}

/// Trace inspection runs as a continuation off the calling task.
pub(crate) fn spawn_trace_report(session: Arc<dyn CqlSession>, query: String, tracing_id: uuid::Uuid) {
    tokio::spawn(async move {
        QueryTracer::new(session).log_report(&query, tracing_id).await;
    });
}
