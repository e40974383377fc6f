use parking_lot::Mutex;
use std::sync::Arc;

use crate::config::DmlLogConfig;
use crate::errors::MapperError;
use crate::lwt::LwtListener;
use crate::query::generator::count_bind_markers;
use crate::session::{BoundStatement, CqlStatement, PreparedSpec};
use crate::types::{ColumnValue, ConsistencyLevel};

/// A prepared statement plus positional values.
///
/// Consistency and the optional serial consistency are applied once, the
/// first time the underlying statement is materialized; the result is
/// memoized in an explicit once-initialized cell so repeated `statement()`
/// calls neither re-bind nor re-apply.
pub struct BoundStatementWrapper {
    prepared: Arc<PreparedSpec>,
    values: Vec<ColumnValue>,
    consistency: Option<ConsistencyLevel>,
    serial_consistency: Option<ConsistencyLevel>,
    counter: bool,
    listener: Option<Arc<dyn LwtListener>>,
    log: DmlLogConfig,
    materialized: Mutex<Option<Arc<CqlStatement>>>,
}

impl std::fmt::Debug for BoundStatementWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundStatementWrapper")
            .field("prepared", &self.prepared)
            .field("values", &self.values)
            .field("consistency", &self.consistency)
            .field("serial_consistency", &self.serial_consistency)
            .field("counter", &self.counter)
            .field("listener", &self.listener.as_ref().map(|_| "<listener>"))
            .field("log", &self.log)
            .field("materialized", &self.materialized)
            .finish()
    }
}

impl BoundStatementWrapper {
    pub fn new(
        prepared: Arc<PreparedSpec>,
        values: Vec<ColumnValue>,
        consistency: Option<ConsistencyLevel>,
        serial_consistency: Option<ConsistencyLevel>,
        log: DmlLogConfig,
    ) -> Result<Self, MapperError> {
        if let Some(level) = serial_consistency {
            if !level.is_serial() {
                return Err(MapperError::Binding(format!(
                    "{} is not a serial consistency level",
                    level
                )));
            }
        }
        let expected = count_bind_markers(&prepared.query);
        if expected != values.len() {
            return Err(MapperError::Binding(format!(
                "query [{}] declares {} bind markers but {} values were bound",
                prepared.query,
                expected,
                values.len()
            )));
        }
        Ok(Self {
            prepared,
            values,
            consistency,
            serial_consistency,
            counter: false,
            listener: None,
            log,
            materialized: Mutex::new(None),
        })
    }

    pub fn with_listener(mut self, listener: Arc<dyn LwtListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Marks this wrapper as a counter mutation; only such statements may
    /// join COUNTER batches.
    pub fn mark_counter(mut self) -> Self {
        self.counter = true;
        self
    }

    pub fn query_string(&self) -> &str {
        &self.prepared.query
    }

    pub fn bound_values(&self) -> &[ColumnValue] {
        &self.values
    }

    pub fn consistency(&self) -> Option<ConsistencyLevel> {
        self.consistency
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

    /// Materializes the bound statement, applying consistency exactly once.
    pub fn statement(&self) -> Result<Arc<CqlStatement>, MapperError> {
        let mut slot = self.materialized.lock();
        if let Some(statement) = slot.as_ref() {
            return Ok(statement.clone());
        }
        let statement = Arc::new(CqlStatement::Prepared(BoundStatement {
            prepared: self.prepared.clone(),
            values: self.values.clone(),
            consistency: self.consistency,
            serial_consistency: self.serial_consistency,
            tracing: self.log.trace_enabled,
            page_size: None,
        }));
        *slot = Some(statement.clone());
        Ok(statement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn prepared(query: &str) -> Arc<PreparedSpec> {
        Arc::new(PreparedSpec { id: Uuid::new_v4(), query: query.to_string() })
    }

    #[test]
    fn test_statement_is_memoized() {
        let wrapper = BoundStatementWrapper::new(
            prepared("INSERT INTO ks.t (a, b) VALUES (?, ?)"),
            vec![ColumnValue::Int(1), ColumnValue::Int(2)],
            Some(ConsistencyLevel::Quorum),
            None,
            DmlLogConfig::default(),
        )
        .unwrap();

        let first = wrapper.statement().unwrap();
        let second = wrapper.statement().unwrap();
        // Same materialized statement both times: consistency was applied
        // exactly once and the values were bound exactly once.
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.consistency(), Some(ConsistencyLevel::Quorum));
    }

    #[test]
    fn test_arity_mismatch_is_a_binding_error() {
        let err = BoundStatementWrapper::new(
            prepared("INSERT INTO ks.t (a, b) VALUES (?, ?)"),
            vec![ColumnValue::Int(1)],
            None,
            None,
            DmlLogConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MapperError::Binding(_)));
        assert!(err.to_string().contains("2 bind markers"));
    }

    #[test]
    fn test_non_serial_level_rejected_as_serial_consistency() {
        let err = BoundStatementWrapper::new(
            prepared("UPDATE ks.t SET a = ? WHERE b = ? IF a = ?"),
            vec![ColumnValue::Int(1), ColumnValue::Int(2), ColumnValue::Int(3)],
            None,
            Some(ConsistencyLevel::Quorum),
            DmlLogConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not a serial consistency level"));
    }

    #[test]
    fn test_serial_consistency_accepted_for_serial_levels() {
        let wrapper = BoundStatementWrapper::new(
            prepared("UPDATE ks.t SET a = ? WHERE b = ? IF a = ?"),
            vec![ColumnValue::Int(1), ColumnValue::Int(2), ColumnValue::Int(3)],
            Some(ConsistencyLevel::Quorum),
            Some(ConsistencyLevel::LocalSerial),
            DmlLogConfig::default(),
        )
        .unwrap();
        let statement = wrapper.statement().unwrap();
        match statement.as_ref() {
            CqlStatement::Prepared(bound) => {
                assert_eq!(bound.serial_consistency, Some(ConsistencyLevel::LocalSerial));
            }
            other => panic!("expected prepared statement, got {:?}", other),
        }
    }
}
