use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::config::DmlLogConfig;
use crate::errors::MapperError;
use crate::lwt::{self, CompositeLwtListener, LwtListener};
use crate::session::{BatchStatement, CqlStatement};
use crate::types::{BatchKind, ConsistencyLevel};

use super::StatementWrapper;

/// An ordered list of child wrappers merged into one server-side batch.
///
/// COUNTER batches may only contain counter mutations (and counter
/// mutations may only appear in COUNTER batches); the mix is rejected
/// before dispatch. The batch's LWT listener is a composite that fans out
/// to every distinct child listener, so a conditional failure inside the
/// batch still reaches the interested party.
pub struct BatchStatementWrapper {
    kind: BatchKind,
    children: Vec<StatementWrapper>,
    consistency: Option<ConsistencyLevel>,
    listener: Option<Arc<dyn LwtListener>>,
    log: DmlLogConfig,
    materialized: Mutex<Option<Arc<CqlStatement>>>,
}

impl std::fmt::Debug for BatchStatementWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchStatementWrapper")
            .field("kind", &self.kind)
            .field("children", &self.children)
            .field("consistency", &self.consistency)
            .field("listener", &self.listener.as_ref().map(|_| "<listener>"))
            .field("log", &self.log)
            .field("materialized", &self.materialized)
            .finish()
    }
}

impl BatchStatementWrapper {
    /// `serial_consistency` is accepted and dropped: the server does not
    /// accept a serial consistency on batches.
    pub fn new(
        kind: BatchKind,
        children: Vec<StatementWrapper>,
        consistency: Option<ConsistencyLevel>,
        serial_consistency: Option<ConsistencyLevel>,
        log: DmlLogConfig,
    ) -> Result<Self, MapperError> {
        if serial_consistency.is_some() {
            debug!("serial consistency is not supported on batches; ignoring");
        }
        for child in &children {
            if matches!(child, StatementWrapper::Batch(_)) {
                return Err(MapperError::Binding(
                    "batches cannot be nested inside a batch".to_string(),
                ));
            }
            match kind {
                BatchKind::Counter if !child.is_counter() => {
                    return Err(MapperError::Binding(format!(
                        "COUNTER batch contains a non-counter statement: [{}]",
                        child.query_string()
                    )));
                }
                BatchKind::Logged | BatchKind::Unlogged if child.is_counter() => {
                    return Err(MapperError::Binding(format!(
                        "{} batch contains a counter mutation: [{}]",
                        kind,
                        child.query_string()
                    )));
                }
                _ => {}
            }
        }

        let child_listeners: Vec<Arc<dyn LwtListener>> =
            children.iter().filter_map(|c| c.lwt_listener()).collect();
        let listener: Option<Arc<dyn LwtListener>> = if child_listeners.is_empty() {
            None
        } else {
            Some(Arc::new(CompositeLwtListener::new(child_listeners)))
        };

        Ok(Self {
            kind,
            children,
            consistency,
            listener,
            log,
            materialized: Mutex::new(None),
        })
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    pub fn children(&self) -> &[StatementWrapper] {
        &self.children
    }

    pub fn consistency(&self) -> Option<ConsistencyLevel> {
        self.consistency
    }

    pub fn lwt_listener(&self) -> Option<Arc<dyn LwtListener>> {
        self.listener.clone()
    }

    /// The query text of the first conditional child, if any; conditional
    /// batches return a single `[applied]` row for the whole batch.
    pub fn conditional_query(&self) -> Option<String> {
        self.children
            .iter()
            .map(|c| c.query_string())
            .find(|q| lwt::conditional_kind(q).is_some())
    }

    pub fn query_string(&self) -> String {
        let kind = match self.kind {
            BatchKind::Logged => "",
            BatchKind::Unlogged => "UNLOGGED ",
            BatchKind::Counter => "COUNTER ",
        };
        let mut text = format!("BEGIN {}BATCH\n", kind);
        for child in &self.children {
            text.push_str(&format!("  {};\n", child.query_string()));
        }
        text.push_str("APPLY BATCH;");
        text
    }

    pub fn log_statement(&self) {
        if !self.log.debug_enabled {
            return;
        }
        let level = self
            .consistency
            .map(|cl| cl.to_string())
            .unwrap_or_else(|| "DEFAULT".to_string());
        debug!(
            logger = %self.log.logger_name,
            consistency = %level,
            "DML batch ({}, {} statements)",
            self.kind,
            self.children.len()
        );
        for child in &self.children {
            child.log_statement();
        }
    }

    /// Builds the underlying batch statement, memoized. Tracing is resolved
    /// across the children first: if any child requested it, it is switched
    /// on for every child and for the batch itself before assembly.
    pub fn statement(&self) -> Result<Arc<CqlStatement>, MapperError> {
        let mut slot = self.materialized.lock();
        if let Some(statement) = slot.as_ref() {
            return Ok(statement.clone());
        }

        let mut statements: Vec<CqlStatement> = Vec::with_capacity(self.children.len());
        for child in &self.children {
            statements.push(child.statement()?.as_ref().clone());
        }
        let tracing = statements.iter().any(|s| s.tracing());
        if tracing {
            for statement in &mut statements {
                match statement {
                    CqlStatement::Simple(s) => s.tracing = true,
                    CqlStatement::Prepared(b) => b.tracing = true,
                    CqlStatement::Batch(_) => {}
                }
            }
        }

        let statement = Arc::new(CqlStatement::Batch(BatchStatement {
            kind: self.kind,
            statements,
            consistency: self.consistency,
            tracing,
        }));
        *slot = Some(statement.clone());
        Ok(statement)
    }
}
