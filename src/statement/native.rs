use std::sync::Arc;

use crate::config::DmlLogConfig;
use crate::errors::MapperError;
use crate::lwt::LwtListener;
use crate::query::generator::count_bind_markers;
use crate::session::{CqlStatement, SimpleStatement};
use crate::types::{ColumnValue, ConsistencyLevel};

/// A caller-supplied statement, taken as-is.
///
/// Driver-level helpers sometimes build statements that do not retain their
/// bind values. When the wrapped statement carries no values but the caller
/// supplied them separately, a new parameterized statement is synthesized
/// from the query text and the supplied values, keeping the original's page
/// size, keyspace, consistency, retry policy and routing key.
pub struct NativeStatementWrapper {
    statement: Arc<CqlStatement>,
    counter: bool,
    listener: Option<Arc<dyn LwtListener>>,
    log: DmlLogConfig,
}

impl std::fmt::Debug for NativeStatementWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeStatementWrapper")
            .field("statement", &self.statement)
            .field("counter", &self.counter)
            .field("listener", &self.listener.as_ref().map(|_| "<listener>"))
            .field("log", &self.log)
            .finish()
    }
}

impl NativeStatementWrapper {
    pub fn new(
        statement: CqlStatement,
        values: Vec<ColumnValue>,
        log: DmlLogConfig,
    ) -> Result<Self, MapperError> {
        let statement = match statement {
            CqlStatement::Batch(_) => {
                return Err(MapperError::Binding(
                    "a batch cannot be wrapped as a native statement".to_string(),
                ));
            }
            CqlStatement::Simple(original) if original.values.is_empty() && !values.is_empty() => {
                CqlStatement::Simple(SimpleStatement {
                    query: original.query,
                    values,
                    consistency: original.consistency,
                    serial_consistency: original.serial_consistency,
                    tracing: original.tracing,
                    page_size: original.page_size,
                    keyspace: original.keyspace,
                    routing_key: original.routing_key,
                    idempotent: original.idempotent,
                    retry_policy: original.retry_policy,
                })
            }
            CqlStatement::Prepared(mut bound) if bound.values.is_empty() && !values.is_empty() => {
                bound.values = values;
                CqlStatement::Prepared(bound)
            }
            other => other,
        };

        let expected = count_bind_markers(&statement.query_string());
        if expected != statement.values().len() {
            return Err(MapperError::Binding(format!(
                "query [{}] declares {} bind markers but {} values were bound",
                statement.query_string(),
                expected,
                statement.values().len()
            )));
        }
        Ok(Self { statement: Arc::new(statement), counter: false, listener: None, log })
    }

    pub fn with_listener(mut self, listener: Arc<dyn LwtListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn mark_counter(mut self) -> Self {
        self.counter = true;
        self
    }

    pub fn query_string(&self) -> String {
        self.statement.query_string()
    }

    pub fn bound_values(&self) -> &[ColumnValue] {
        self.statement.values()
    }

    pub fn consistency(&self) -> Option<ConsistencyLevel> {
        self.statement.consistency()
    }

    pub fn is_counter(&self) -> bool {
        self.counter
    }

    pub fn lwt_listener(&self) -> Option<Arc<dyn LwtListener>> {
        self.listener.clone()
    }

    pub(crate) fn log_config(&self) -> &DmlLogConfig {
        &self.log
    }

    pub fn statement(&self) -> Arc<CqlStatement> {
        self.statement.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicySpec;

    #[test]
    fn test_repair_synthesizes_statement_with_original_options() {
        let mut original = SimpleStatement::new("INSERT INTO ks.t (a, b) VALUES (?, ?)");
        original.page_size = Some(500);
        original.keyspace = Some("ks".to_string());
        original.consistency = Some(ConsistencyLevel::EachQuorum);
        original.routing_key = Some(vec![0x01, 0x02]);
        original.retry_policy = Some(RetryPolicySpec::default());

        let wrapper = NativeStatementWrapper::new(
            CqlStatement::Simple(original),
            vec![ColumnValue::Int(1), ColumnValue::Int(2)],
            DmlLogConfig::default(),
        )
        .unwrap();

        match wrapper.statement().as_ref() {
            CqlStatement::Simple(repaired) => {
                assert_eq!(repaired.values.len(), 2);
                assert_eq!(repaired.page_size, Some(500));
                assert_eq!(repaired.keyspace.as_deref(), Some("ks"));
                assert_eq!(repaired.consistency, Some(ConsistencyLevel::EachQuorum));
                assert_eq!(repaired.routing_key, Some(vec![0x01, 0x02]));
                assert!(repaired.retry_policy.is_some());
            }
            other => panic!("expected simple statement, got {:?}", other),
        }
    }

    #[test]
    fn test_statement_with_values_kept_untouched() {
        let original = SimpleStatement::new("DELETE FROM ks.t WHERE a = ?")
            .with_values(vec![ColumnValue::Int(9)]);
        let wrapper = NativeStatementWrapper::new(
            CqlStatement::Simple(original.clone()),
            vec![],
            DmlLogConfig::default(),
        )
        .unwrap();
        assert_eq!(wrapper.bound_values(), original.values.as_slice());
    }

    #[test]
    fn test_batch_rejected() {
        let batch = CqlStatement::Batch(crate::session::BatchStatement {
            kind: crate::types::BatchKind::Logged,
            statements: vec![],
            consistency: None,
            tracing: false,
        });
        let err = NativeStatementWrapper::new(batch, vec![], DmlLogConfig::default()).unwrap_err();
        assert!(matches!(err, MapperError::Binding(_)));
    }
}
