use std::sync::Arc;

use crate::config::DmlLogConfig;
use crate::errors::MapperError;
use crate::lwt::LwtListener;
use crate::query::generator::count_bind_markers;
use crate::session::{CqlStatement, SimpleStatement};
use crate::types::{ColumnValue, ConsistencyLevel};

/// An ad-hoc built statement with its own bound values. Consistency is
/// applied eagerly at construction, unlike the lazily-materialized bound
/// wrapper.
pub struct RegularStatementWrapper {
    statement: Arc<CqlStatement>,
    query: String,
    values: Vec<ColumnValue>,
    consistency: Option<ConsistencyLevel>,
    counter: bool,
    listener: Option<Arc<dyn LwtListener>>,
    log: DmlLogConfig,
}

impl std::fmt::Debug for RegularStatementWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegularStatementWrapper")
            .field("statement", &self.statement)
            .field("query", &self.query)
            .field("values", &self.values)
            .field("consistency", &self.consistency)
            .field("counter", &self.counter)
            .field("listener", &self.listener.as_ref().map(|_| "<listener>"))
            .field("log", &self.log)
            .finish()
    }
}

impl RegularStatementWrapper {
    pub fn new(
        mut simple: SimpleStatement,
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
        let expected = count_bind_markers(&simple.query);
        if expected != simple.values.len() {
            return Err(MapperError::Binding(format!(
                "query [{}] declares {} bind markers but {} values were bound",
                simple.query,
                expected,
                simple.values.len()
            )));
        }
        if consistency.is_some() {
            simple.consistency = consistency;
        }
        if serial_consistency.is_some() {
            simple.serial_consistency = serial_consistency;
        }
        simple.tracing = simple.tracing || log.trace_enabled;

        let query = simple.query.clone();
        let values = simple.values.clone();
        let consistency = simple.consistency;
        Ok(Self {
            statement: Arc::new(CqlStatement::Simple(simple)),
            query,
            values,
            consistency,
            counter: false,
            listener: None,
            log,
        })
    }

    pub fn with_listener(mut self, listener: Arc<dyn LwtListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn mark_counter(mut self) -> Self {
        self.counter = true;
        self
    }

    pub fn query_string(&self) -> &str {
        &self.query
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

    pub fn statement(&self) -> Arc<CqlStatement> {
        self.statement.clone()
    }
}
