//! Pending-statement queues for one logical unit of work.
//!
//! A context is created per logical operation (persist/merge/remove) or per
//! explicit batch session, and is owned by exactly one caller task; it is
//! not meant for concurrent mutation. The mode is fixed at construction and
//! never transitions.

use std::mem;
use std::sync::Arc;
use tracing::debug;

use crate::config::DmlLogConfig;
use crate::errors::MapperError;
use crate::session::CqlSession;
use crate::statement::{BatchStatementWrapper, StatementWrapper};
use crate::types::{BatchKind, ConsistencyLevel, ResultSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Statements are sent one by one, in push order, on `flush()`.
    Immediate,
    /// Statements accumulate until `end_batch()` merges them into batch
    /// statements.
    Batch,
}

pub struct FlushContext {
    mode: FlushMode,
    session: Arc<dyn CqlSession>,
    batch_kind: BatchKind,
    log: DmlLogConfig,
    pending: Vec<StatementWrapper>,
    read_consistency: Option<ConsistencyLevel>,
    write_consistency: Option<ConsistencyLevel>,
    ttl: Option<i32>,
}

impl FlushContext {
    pub fn immediate(session: Arc<dyn CqlSession>, log: DmlLogConfig) -> Self {
        Self {
            mode: FlushMode::Immediate,
            session,
            batch_kind: BatchKind::Logged,
            log,
            pending: Vec::new(),
            read_consistency: None,
            write_consistency: None,
            ttl: None,
        }
    }

    pub fn batch(session: Arc<dyn CqlSession>, batch_kind: BatchKind, log: DmlLogConfig) -> Self {
        Self {
            mode: FlushMode::Batch,
            session,
            batch_kind,
            log,
            pending: Vec::new(),
            read_consistency: None,
            write_consistency: None,
            ttl: None,
        }
    }

    pub fn mode(&self) -> FlushMode {
        self.mode
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn set_read_consistency_level(&mut self, level: ConsistencyLevel) {
        self.read_consistency = Some(level);
    }

    pub fn set_write_consistency_level(&mut self, level: ConsistencyLevel) {
        self.write_consistency = Some(level);
    }

    pub fn read_consistency_level(&self) -> Option<ConsistencyLevel> {
        self.read_consistency
    }

    pub fn write_consistency_level(&self) -> Option<ConsistencyLevel> {
        self.write_consistency
    }

    pub fn set_ttl(&mut self, ttl: i32) {
        self.ttl = Some(ttl);
    }

    pub fn ttl(&self) -> Option<i32> {
        self.ttl
    }

    pub fn push_statement(&mut self, wrapper: StatementWrapper) {
        self.pending.push(wrapper);
    }

    /// Dispatches one wrapper through this context's session without
    /// touching the queue.
    pub async fn execute_async(&self, wrapper: &StatementWrapper) -> Result<ResultSet, MapperError> {
        wrapper.execute(&self.session).await
    }

    /// Immediate mode: executes every queued statement in push order, one
    /// round trip each. The queue is drained before execution starts, so it
    /// is empty again even when a statement fails; the first failure
    /// propagates after that cleanup. Batch mode: a no-op, statements keep
    /// accumulating until `end_batch()`.
    pub async fn flush(&mut self) -> Result<Vec<ResultSet>, MapperError> {
        match self.mode {
            FlushMode::Batch => Ok(Vec::new()),
            FlushMode::Immediate => {
                let drained = mem::take(&mut self.pending);
                let mut results = Vec::with_capacity(drained.len());
                for wrapper in &drained {
                    results.push(wrapper.execute(&self.session).await?);
                }
                Ok(results)
            }
        }
    }

    /// Batch mode only: idempotently clears the queue and every per-context
    /// override. A fresh batch begins with no inherited state.
    pub fn start_batch(&mut self) -> Result<(), MapperError> {
        if self.mode == FlushMode::Immediate {
            return Err(MapperError::IllegalState(
                "start_batch() on an immediate flush context; use a batch-scoped entry point instead"
                    .to_string(),
            ));
        }
        self.reset();
        Ok(())
    }

    /// Batch mode only: merges the queue into batch statements honoring the
    /// context's write-consistency override, sends them, then performs the
    /// same reset as `start_batch()`. Counter mutations are split into
    /// their own COUNTER batch; the server refuses mixed batches. An empty
    /// queue sends nothing.
    pub async fn end_batch(&mut self) -> Result<Vec<ResultSet>, MapperError> {
        if self.mode == FlushMode::Immediate {
            return Err(MapperError::IllegalState(
                "end_batch() on an immediate flush context; use a batch-scoped entry point instead"
                    .to_string(),
            ));
        }
        let drained = mem::take(&mut self.pending);
        let outcome = self.send_batches(drained).await;
        self.reset();
        outcome
    }

    async fn send_batches(
        &self,
        drained: Vec<StatementWrapper>,
    ) -> Result<Vec<ResultSet>, MapperError> {
        let (counters, plain): (Vec<_>, Vec<_>) =
            drained.into_iter().partition(|w| w.is_counter());
        let mut results = Vec::new();
        if !plain.is_empty() {
            let batch = BatchStatementWrapper::new(
                self.batch_kind,
                plain,
                self.write_consistency,
                None,
                self.log.clone(),
            )?;
            results.push(StatementWrapper::Batch(batch).execute(&self.session).await?);
        }
        if !counters.is_empty() {
            let batch = BatchStatementWrapper::new(
                BatchKind::Counter,
                counters,
                self.write_consistency,
                None,
                self.log.clone(),
            )?;
            results.push(StatementWrapper::Batch(batch).execute(&self.session).await?);
        }
        Ok(results)
    }

    fn reset(&mut self) {
        if !self.pending.is_empty() {
            debug!("Discarding {} pending statements on batch reset", self.pending.len());
        }
        self.pending.clear();
        self.read_consistency = None;
        self.write_consistency = None;
        self.ttl = None;
    }

    /// A sibling context of the same mode sharing the session, with the
    /// overrides carried over. Used when cascading into an associated
    /// entity.
    pub fn duplicate(&self) -> Self {
        Self {
            mode: self.mode,
            session: self.session.clone(),
            batch_kind: self.batch_kind,
            log: self.log.clone(),
            pending: Vec::new(),
            read_consistency: self.read_consistency,
            write_consistency: self.write_consistency,
            ttl: self.ttl,
        }
    }

    /// Like `duplicate()` but with the TTL override cleared: a write
    /// cascading to a related entity must not silently inherit a TTL meant
    /// only for the root entity.
    pub fn duplicate_without_ttl(&self) -> Self {
        let mut context = self.duplicate();
        context.ttl = None;
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::APPLIED_COLUMN;
    use crate::session::SimpleStatement;
    use crate::statement::RegularStatementWrapper;
    use crate::test_support::RecordingSession;
    use crate::types::{ColumnSpec, ColumnValue, CqlType};

    fn wrapper(query: &str) -> StatementWrapper {
        StatementWrapper::Regular(
            RegularStatementWrapper::new(
                SimpleStatement::new(query).with_values(vec![ColumnValue::Int(1)]),
                None,
                None,
                DmlLogConfig::default(),
            )
            .unwrap(),
        )
    }

    fn counter_wrapper() -> StatementWrapper {
        StatementWrapper::Regular(
            RegularStatementWrapper::new(
                SimpleStatement::new(
                    "UPDATE ks.entity_counters SET value = value + ? WHERE fqcn = 'x'",
                )
                .with_values(vec![ColumnValue::Counter(1)]),
                None,
                None,
                DmlLogConfig::default(),
            )
            .unwrap()
            .mark_counter(),
        )
    }

    #[tokio::test]
    async fn test_immediate_flush_executes_in_push_order_and_clears() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let session = RecordingSession::new();
        let mut context = FlushContext::immediate(session.clone(), DmlLogConfig::verbose());
        context.push_statement(wrapper("INSERT INTO ks.t (a) VALUES (?)"));
        context.push_statement(wrapper("UPDATE ks.t SET a = ? WHERE b = 1"));

        let results = context.flush().await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(context.pending_count(), 0);

        let executed = session.executed.lock();
        assert!(executed[0].query_string().starts_with("INSERT"));
        assert!(executed[1].query_string().starts_with("UPDATE"));
    }

    #[tokio::test]
    async fn test_immediate_flush_clears_queue_on_failure() {
        let session = RecordingSession::failing();
        let mut context = FlushContext::immediate(session.clone(), DmlLogConfig::default());
        context.push_statement(wrapper("INSERT INTO ks.t (a) VALUES (?)"));
        context.push_statement(wrapper("UPDATE ks.t SET a = ? WHERE b = 1"));

        let err = context.flush().await.unwrap_err();
        assert!(matches!(err, MapperError::Database(_)));
        assert_eq!(context.pending_count(), 0);
        assert_eq!(session.executed_count(), 1);
    }

    #[tokio::test]
    async fn test_immediate_rejects_batch_entry_points() {
        let session = RecordingSession::new();
        let mut context = FlushContext::immediate(session, DmlLogConfig::default());
        assert!(matches!(context.start_batch(), Err(MapperError::IllegalState(_))));
        assert!(matches!(context.end_batch().await, Err(MapperError::IllegalState(_))));
    }

    #[tokio::test]
    async fn test_batch_flush_is_a_noop() {
        let session = RecordingSession::new();
        let mut context =
            FlushContext::batch(session.clone(), BatchKind::Logged, DmlLogConfig::default());
        context.push_statement(wrapper("INSERT INTO ks.t (a) VALUES (?)"));
        context.flush().await.unwrap();
        assert_eq!(session.executed_count(), 0);
        assert_eq!(context.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_end_batch_sends_nothing_and_resets() {
        let session = RecordingSession::new();
        let mut context =
            FlushContext::batch(session.clone(), BatchKind::Logged, DmlLogConfig::default());
        context.set_write_consistency_level(ConsistencyLevel::Quorum);
        context.set_ttl(60);

        context.start_batch().unwrap();
        let results = context.end_batch().await.unwrap();
        assert!(results.is_empty());
        assert_eq!(session.executed_count(), 0);
        assert_eq!(context.write_consistency_level(), None);
        assert_eq!(context.ttl(), None);
    }

    #[tokio::test]
    async fn test_end_batch_merges_queue_and_applies_override() {
        let session = RecordingSession::new();
        let mut context =
            FlushContext::batch(session.clone(), BatchKind::Unlogged, DmlLogConfig::default());
        context.set_write_consistency_level(ConsistencyLevel::Quorum);
        context.push_statement(wrapper("INSERT INTO ks.t (a) VALUES (?)"));
        context.push_statement(wrapper("UPDATE ks.t SET a = ? WHERE b = 1"));

        context.end_batch().await.unwrap();
        assert_eq!(session.executed_count(), 1);
        let executed = session.executed.lock();
        match &executed[0] {
            crate::session::CqlStatement::Batch(batch) => {
                assert_eq!(batch.kind, BatchKind::Unlogged);
                assert_eq!(batch.statements.len(), 2);
                assert_eq!(batch.consistency, Some(ConsistencyLevel::Quorum));
            }
            other => panic!("expected a batch statement, got {:?}", other),
        }
        drop(executed);
        assert_eq!(context.pending_count(), 0);
        assert_eq!(context.write_consistency_level(), None);
    }

    #[tokio::test]
    async fn test_counter_statements_split_into_counter_batch() {
        let session = RecordingSession::new();
        let mut context =
            FlushContext::batch(session.clone(), BatchKind::Logged, DmlLogConfig::default());
        context.push_statement(wrapper("INSERT INTO ks.t (a) VALUES (?)"));
        context.push_statement(counter_wrapper());

        context.end_batch().await.unwrap();
        assert_eq!(session.executed_count(), 2);
        let executed = session.executed.lock();
        let kinds: Vec<BatchKind> = executed
            .iter()
            .map(|s| match s {
                crate::session::CqlStatement::Batch(b) => b.kind,
                other => panic!("expected batches, got {:?}", other),
            })
            .collect();
        assert_eq!(kinds, vec![BatchKind::Logged, BatchKind::Counter]);
    }

    #[tokio::test]
    async fn test_duplicate_without_ttl_preserves_consistency() {
        let session = RecordingSession::new();
        let mut context = FlushContext::immediate(session, DmlLogConfig::default());
        context.set_read_consistency_level(ConsistencyLevel::LocalQuorum);
        context.set_write_consistency_level(ConsistencyLevel::EachQuorum);
        context.set_ttl(115);

        let child = context.duplicate_without_ttl();
        assert_eq!(child.read_consistency_level(), Some(ConsistencyLevel::LocalQuorum));
        assert_eq!(child.write_consistency_level(), Some(ConsistencyLevel::EachQuorum));
        assert_eq!(child.ttl(), None);
        assert_eq!(child.mode(), FlushMode::Immediate);

        let sibling = context.duplicate();
        assert_eq!(sibling.ttl(), Some(115));
    }

    #[tokio::test]
    async fn test_conflict_during_flush_propagates_outcome() {
        let session = RecordingSession::new();
        session.push_result(crate::types::ResultSet {
            columns: vec![ColumnSpec {
                name: APPLIED_COLUMN.to_string(),
                cql_type: CqlType::Boolean,
            }],
            rows: vec![vec![ColumnValue::Boolean(false)]],
            tracing_id: None,
        });
        let mut context = FlushContext::immediate(session, DmlLogConfig::default());
        context.push_statement(wrapper("INSERT INTO ks.t (a) VALUES (?) IF NOT EXISTS"));

        let err = context.flush().await.unwrap_err();
        assert!(matches!(err, MapperError::Conflict { .. }));
        assert_eq!(context.pending_count(), 0);
    }
}
