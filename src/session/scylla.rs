//! `CqlSession` implementation backed by the scylla driver. All
//! driver-type conversions live at this edge; the execution core above it
//! only ever sees the crate's own statement and value model.

use async_trait::async_trait;
use dashmap::DashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use scylla::batch::{Batch, BatchType};
use scylla::frame::response::result::{ColumnType, CqlValue};
use scylla::frame::value::{Counter, CqlTimestamp};
use scylla::prepared_statement::PreparedStatement;
use scylla::query::Query;
use scylla::statement::{Consistency, SerialConsistency};
use scylla::transport::session::PoolSize;
use scylla::{QueryResult, Session, SessionBuilder};

use crate::config::DatabaseConfig;
use crate::errors::MapperError;
use crate::session::{
    BoundStatement, CqlSession, CqlStatement, PreparedSpec, SimpleStatement,
};
use crate::tracer::{QueryTrace, TraceEvent};
use crate::types::{BatchKind, ColumnSpec, ColumnValue, ConsistencyLevel, CqlType, ResultSet};

pub struct ScyllaSession {
    session: Arc<Session>,
    prepared: DashMap<Uuid, PreparedStatement>,
}

impl ScyllaSession {
    /// Connect and select the configured keyspace.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, MapperError> {
        info!("Connecting to cluster: {:?}", config.hosts);

        let contact_points: Vec<String> = config
            .hosts
            .iter()
            .map(|host| format!("{}:{}", host, config.port))
            .collect();

        let pool_size = NonZeroUsize::new(config.pool_size as usize)
            .unwrap_or(NonZeroUsize::new(4).unwrap());

        let mut session_builder = SessionBuilder::new()
            .known_nodes(&contact_points)
            .pool_size(PoolSize::PerShard(pool_size))
            .connection_timeout(config.connection_timeout)
            .use_keyspace(&config.keyspace, true);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            session_builder = session_builder.user(username, password);
        }

        let session = session_builder
            .build()
            .await
            .map_err(|e| MapperError::Database(format!("Connection failed: {}", e)))?;

        info!("Connected to keyspace: {}", config.keyspace);
        Ok(Self::from_session(Arc::new(session)))
    }

    /// Wrap an already-built session.
    pub fn from_session(session: Arc<Session>) -> Self {
        Self { session, prepared: DashMap::new() }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    async fn execute_simple(&self, simple: &SimpleStatement) -> Result<QueryResult, MapperError> {
        let mut query = Query::new(simple.query.clone());
        if let Some(level) = simple.consistency {
            query.set_consistency(to_consistency(level));
        }
        if let Some(level) = simple.serial_consistency {
            query.set_serial_consistency(Some(to_serial_consistency(level)?));
        }
        if let Some(page_size) = simple.page_size {
            query.set_page_size(page_size);
        }
        query.set_is_idempotent(simple.idempotent);
        query.set_tracing(simple.tracing);
        let values = to_cql_values(&simple.values);

        let result = match &simple.retry_policy {
            Some(policy) => {
                policy
                    .execute(|| {
                        let query = query.clone();
                        let values = values.clone();
                        async move { self.session.query_unpaged(query, values).await }
                    })
                    .await?
            }
            None => self.session.query_unpaged(query, values).await?,
        };
        Ok(result)
    }

    async fn execute_prepared(&self, bound: &BoundStatement) -> Result<QueryResult, MapperError> {
        let mut prepared = self
            .prepared
            .get(&bound.prepared.id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                MapperError::Binding(format!(
                    "statement [{}] was not prepared on this session",
                    bound.prepared.query
                ))
            })?;
        if let Some(level) = bound.consistency {
            prepared.set_consistency(to_consistency(level));
        }
        if let Some(level) = bound.serial_consistency {
            prepared.set_serial_consistency(Some(to_serial_consistency(level)?));
        }
        if let Some(page_size) = bound.page_size {
            prepared.set_page_size(page_size);
        }
        prepared.set_tracing(bound.tracing);
        let values = to_cql_values(&bound.values);
        Ok(self.session.execute_unpaged(&prepared, values).await?)
    }

    async fn execute_batch(
        &self,
        batch: &crate::session::BatchStatement,
    ) -> Result<QueryResult, MapperError> {
        let mut driver_batch = Batch::new(to_batch_type(batch.kind));
        let mut values: Vec<Vec<CqlValue>> = Vec::with_capacity(batch.statements.len());
        for child in &batch.statements {
            match child {
                CqlStatement::Simple(simple) => {
                    driver_batch.append_statement(Query::new(simple.query.clone()));
                    values.push(to_cql_values(&simple.values));
                }
                CqlStatement::Prepared(bound) => {
                    let prepared = self
                        .prepared
                        .get(&bound.prepared.id)
                        .map(|entry| entry.value().clone())
                        .ok_or_else(|| {
                            MapperError::Binding(format!(
                                "statement [{}] was not prepared on this session",
                                bound.prepared.query
                            ))
                        })?;
                    driver_batch.append_statement(prepared);
                    values.push(to_cql_values(&bound.values));
                }
                CqlStatement::Batch(_) => {
                    return Err(MapperError::Binding(
                        "batches cannot be nested inside a batch".to_string(),
                    ));
                }
            }
        }
        if let Some(level) = batch.consistency {
            driver_batch.set_consistency(to_consistency(level));
        }
        driver_batch.set_tracing(batch.tracing);
        Ok(self.session.batch(&driver_batch, values).await?)
    }
}

#[async_trait]
impl CqlSession for ScyllaSession {
    async fn prepare(&self, query: &str) -> Result<Arc<PreparedSpec>, MapperError> {
        let prepared = self.session.prepare(query).await?;
        let id = Uuid::new_v4();
        self.prepared.insert(id, prepared);
        Ok(Arc::new(PreparedSpec { id, query: query.to_string() }))
    }

    async fn execute(&self, statement: &CqlStatement) -> Result<ResultSet, MapperError> {
        let result = match statement {
            CqlStatement::Simple(simple) => self.execute_simple(simple).await?,
            CqlStatement::Prepared(bound) => self.execute_prepared(bound).await?,
            CqlStatement::Batch(batch) => self.execute_batch(batch).await?,
        };
        from_query_result(result)
    }

    async fn fetch_trace(&self, tracing_id: Uuid) -> Result<QueryTrace, MapperError> {
        let info = self
            .session
            .get_tracing_info(&tracing_id)
            .await
            .map_err(|e| MapperError::Trace(e.to_string()))?;
        Ok(QueryTrace {
            coordinator: info.coordinator,
            duration_micros: info.duration,
            request: info.request,
            events: info
                .events
                .into_iter()
                .map(|event| TraceEvent {
                    activity: event.activity,
                    source: event.source,
                    source_elapsed_micros: event.source_elapsed,
                    thread: event.thread,
                })
                .collect(),
        })
    }
}

fn to_consistency(level: ConsistencyLevel) -> Consistency {
    match level {
        ConsistencyLevel::Any => Consistency::Any,
        ConsistencyLevel::One => Consistency::One,
        ConsistencyLevel::Two => Consistency::Two,
        ConsistencyLevel::Three => Consistency::Three,
        ConsistencyLevel::Quorum => Consistency::Quorum,
        ConsistencyLevel::All => Consistency::All,
        ConsistencyLevel::LocalQuorum => Consistency::LocalQuorum,
        ConsistencyLevel::EachQuorum => Consistency::EachQuorum,
        ConsistencyLevel::LocalOne => Consistency::LocalOne,
        ConsistencyLevel::Serial => Consistency::Serial,
        ConsistencyLevel::LocalSerial => Consistency::LocalSerial,
    }
}

fn to_serial_consistency(level: ConsistencyLevel) -> Result<SerialConsistency, MapperError> {
    match level {
        ConsistencyLevel::Serial => Ok(SerialConsistency::Serial),
        ConsistencyLevel::LocalSerial => Ok(SerialConsistency::LocalSerial),
        other => Err(MapperError::Binding(format!(
            "{} is not a serial consistency level",
            other
        ))),
    }
}

fn to_batch_type(kind: BatchKind) -> BatchType {
    match kind {
        BatchKind::Logged => BatchType::Logged,
        BatchKind::Unlogged => BatchType::Unlogged,
        BatchKind::Counter => BatchType::Counter,
    }
}

fn to_cql_values(values: &[ColumnValue]) -> Vec<CqlValue> {
    values.iter().map(to_cql_value).collect()
}

fn to_cql_value(value: &ColumnValue) -> CqlValue {
    match value {
        ColumnValue::Null => CqlValue::Empty,
        ColumnValue::Boolean(b) => CqlValue::Boolean(*b),
        ColumnValue::Int(v) => CqlValue::Int(*v),
        ColumnValue::BigInt(v) => CqlValue::BigInt(*v),
        ColumnValue::Counter(v) => CqlValue::Counter(Counter(*v)),
        ColumnValue::Float(v) => CqlValue::Float(*v),
        ColumnValue::Double(v) => CqlValue::Double(*v),
        ColumnValue::Text(s) => CqlValue::Text(s.clone()),
        ColumnValue::Blob(bytes) => CqlValue::Blob(bytes.clone()),
        ColumnValue::Uuid(u) => CqlValue::Uuid(*u),
        ColumnValue::Timestamp(ms) => CqlValue::Timestamp(CqlTimestamp(*ms)),
        ColumnValue::List(items) => CqlValue::List(items.iter().map(to_cql_value).collect()),
        ColumnValue::Set(items) => CqlValue::Set(items.iter().map(to_cql_value).collect()),
        ColumnValue::Map(pairs) => CqlValue::Map(
            pairs
                .iter()
                .map(|(k, v)| (to_cql_value(k), to_cql_value(v)))
                .collect(),
        ),
    }
}

/// Decodes a driver value by its variant; collections recurse into their
/// element values.
fn from_cql_value(value: CqlValue) -> Result<ColumnValue, MapperError> {
    match value {
        CqlValue::Empty => Ok(ColumnValue::Null),
        CqlValue::Boolean(b) => Ok(ColumnValue::Boolean(b)),
        CqlValue::Int(v) => Ok(ColumnValue::Int(v)),
        CqlValue::BigInt(v) => Ok(ColumnValue::BigInt(v)),
        CqlValue::Counter(c) => Ok(ColumnValue::Counter(c.0)),
        CqlValue::Float(v) => Ok(ColumnValue::Float(v)),
        CqlValue::Double(v) => Ok(ColumnValue::Double(v)),
        CqlValue::Ascii(s) | CqlValue::Text(s) => Ok(ColumnValue::Text(s)),
        CqlValue::Blob(bytes) => Ok(ColumnValue::Blob(bytes)),
        CqlValue::Uuid(u) => Ok(ColumnValue::Uuid(u)),
        CqlValue::Timestamp(ts) => Ok(ColumnValue::Timestamp(ts.0)),
        CqlValue::List(items) => Ok(ColumnValue::List(
            items.into_iter().map(from_cql_value).collect::<Result<_, _>>()?,
        )),
        CqlValue::Set(items) => Ok(ColumnValue::Set(
            items.into_iter().map(from_cql_value).collect::<Result<_, _>>()?,
        )),
        CqlValue::Map(pairs) => Ok(ColumnValue::Map(
            pairs
                .into_iter()
                .map(|(k, v)| Ok((from_cql_value(k)?, from_cql_value(v)?)))
                .collect::<Result<_, MapperError>>()?,
        )),
        other => Err(MapperError::Database(format!(
            "unsupported CQL value in result: {:?}",
            other
        ))),
    }
}

fn from_column_type(typ: &ColumnType) -> Result<CqlType, MapperError> {
    match typ {
        ColumnType::Boolean => Ok(CqlType::Boolean),
        ColumnType::Int => Ok(CqlType::Int),
        ColumnType::BigInt => Ok(CqlType::BigInt),
        ColumnType::Counter => Ok(CqlType::Counter),
        ColumnType::Float => Ok(CqlType::Float),
        ColumnType::Double => Ok(CqlType::Double),
        ColumnType::Ascii | ColumnType::Text => Ok(CqlType::Text),
        ColumnType::Blob => Ok(CqlType::Blob),
        ColumnType::Uuid => Ok(CqlType::Uuid),
        ColumnType::Timestamp => Ok(CqlType::Timestamp),
        ColumnType::List(inner) => Ok(CqlType::List(Box::new(from_column_type(inner)?))),
        ColumnType::Set(inner) => Ok(CqlType::Set(Box::new(from_column_type(inner)?))),
        ColumnType::Map(key, value) => Ok(CqlType::Map(
            Box::new(from_column_type(key)?),
            Box::new(from_column_type(value)?),
        )),
        other => Err(MapperError::Database(format!(
            "unsupported CQL column type in result: {:?}",
            other
        ))),
    }
}

fn from_query_result(result: QueryResult) -> Result<ResultSet, MapperError> {
    let columns = result
        .col_specs()
        .iter()
        .map(|spec| {
            Ok(ColumnSpec { name: spec.name.clone(), cql_type: from_column_type(&spec.typ)? })
        })
        .collect::<Result<Vec<_>, MapperError>>()?;
    let tracing_id = result.tracing_id;
    let rows = result
        .rows_or_empty()
        .into_iter()
        .map(|row| {
            row.columns
                .into_iter()
                .map(|value| match value {
                    None => Ok(ColumnValue::Null),
                    Some(value) => from_cql_value(value),
                })
                .collect::<Result<Vec<_>, MapperError>>()
        })
        .collect::<Result<Vec<_>, MapperError>>()?;
    Ok(ResultSet { columns, rows, tracing_id })
}
