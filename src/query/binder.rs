use std::sync::Arc;

use crate::config::DmlLogConfig;
use crate::consistency;
use crate::errors::MapperError;
use crate::flush::FlushContext;
use crate::lwt::LwtListener;
use crate::metadata::{ColumnMeta, EntityMeta};
use crate::query::cache::PreparedQueryCache;
use crate::query::BindRole;
use crate::session::CqlSession;
use crate::statement::{BoundStatementWrapper, StatementWrapper};
use crate::types::{ColumnValue, ConsistencyLevel, CqlType};

/// Per-call options for a bound write.
#[derive(Default)]
pub struct WriteOptions {
    pub if_not_exists: bool,
    pub ttl: Option<i32>,
    pub timestamp: Option<i64>,
    /// Per-call consistency override, the highest precedence layer.
    pub consistency: Option<ConsistencyLevel>,
    pub serial_consistency: Option<ConsistencyLevel>,
    pub listener: Option<Arc<dyn LwtListener>>,
}

/// Binds concrete values against cached query specs and assembles bound
/// statement wrappers. Query text is generated once per (entity, operation)
/// shape; every call after that only binds.
///
/// Consistency is resolved here, at statement-build time, from the per-call
/// override, the supplied context override, and the entity's static default.
pub struct Binder {
    cache: Arc<PreparedQueryCache>,
    session: Arc<dyn CqlSession>,
    log: DmlLogConfig,
}

impl Binder {
    pub fn new(cache: Arc<PreparedQueryCache>, session: Arc<dyn CqlSession>, log: DmlLogConfig) -> Self {
        Self { cache, session, log }
    }

    pub fn cache(&self) -> &Arc<PreparedQueryCache> {
        &self.cache
    }

    pub async fn bind_insert(
        &self,
        fqcn: &str,
        primary_key: &[ColumnValue],
        columns: &[ColumnValue],
        options: WriteOptions,
        context: Option<&FlushContext>,
    ) -> Result<StatementWrapper, MapperError> {
        let meta = self.cache.meta(fqcn)?;
        validate_primary_key(&meta, primary_key)?;
        validate_columns(&meta, columns)?;

        let ttl = options.ttl.or(context.and_then(|c| c.ttl()));
        let spec = self.cache.insert_spec(
            fqcn,
            options.if_not_exists,
            ttl.is_some(),
            options.timestamp.is_some(),
        )?;
        let mut values: Vec<ColumnValue> = Vec::with_capacity(spec.bind_count());
        values.extend_from_slice(primary_key);
        values.extend_from_slice(columns);
        push_using_values(&spec.roles, ttl, options.timestamp, &mut values);

        self.assemble(&meta, spec.as_ref(), values, options, context)
            .await
    }

    pub async fn bind_update(
        &self,
        fqcn: &str,
        changed: &[(String, ColumnValue)],
        primary_key: &[ColumnValue],
        options: WriteOptions,
        context: Option<&FlushContext>,
    ) -> Result<StatementWrapper, MapperError> {
        let meta = self.cache.meta(fqcn)?;
        validate_primary_key(&meta, primary_key)?;
        if changed.is_empty() {
            return Err(MapperError::Binding(format!(
                "update of entity '{}' changes no columns",
                fqcn
            )));
        }
        for (name, value) in changed {
            let column = meta
                .regular_columns
                .iter()
                .find(|c| &c.name == name)
                .ok_or_else(|| {
                    MapperError::Binding(format!(
                        "entity '{}' has no column '{}' to update",
                        fqcn, name
                    ))
                })?;
            validate_value(&meta, column, value)?;
        }

        let names: Vec<String> = changed.iter().map(|(name, _)| name.clone()).collect();
        let ttl = options.ttl.or(context.and_then(|c| c.ttl()));
        let spec = self.cache.update_spec(fqcn, &names, ttl.is_some(), options.timestamp.is_some())?;
        // Update markers put the USING values first.
        let mut values: Vec<ColumnValue> = Vec::with_capacity(spec.bind_count());
        push_using_values(&spec.roles, ttl, options.timestamp, &mut values);
        values.extend(changed.iter().map(|(_, value)| value.clone()));
        values.extend_from_slice(primary_key);

        self.assemble(&meta, spec.as_ref(), values, options, context)
            .await
    }

    pub async fn bind_select(
        &self,
        fqcn: &str,
        primary_key: &[ColumnValue],
        per_call: Option<ConsistencyLevel>,
        context: Option<&FlushContext>,
    ) -> Result<StatementWrapper, MapperError> {
        let meta = self.cache.meta(fqcn)?;
        validate_primary_key(&meta, primary_key)?;
        let spec = self.cache.select_spec(fqcn)?;
        let context_level = context.and_then(|c| c.read_consistency_level());
        let resolved = consistency::resolve(per_call, context_level, meta.read_consistency);
        let prepared = self.cache.driver_prepared(&self.session, spec.as_ref()).await?;
        let wrapper = BoundStatementWrapper::new(
            prepared,
            primary_key.to_vec(),
            resolved,
            None,
            self.log.clone(),
        )?;
        Ok(StatementWrapper::Bound(wrapper))
    }

    pub async fn bind_delete(
        &self,
        fqcn: &str,
        table: &str,
        primary_key: &[ColumnValue],
        options: WriteOptions,
        context: Option<&FlushContext>,
    ) -> Result<StatementWrapper, MapperError> {
        let meta = self.cache.meta(fqcn)?;
        validate_primary_key(&meta, primary_key)?;
        let spec = self.cache.delete_spec(fqcn, table)?;
        self.assemble(&meta, spec.as_ref(), primary_key.to_vec(), options, context)
            .await
    }

    /// Counter mutations route through the fixed side table; the bind is
    /// always the delta plus the three addressing values.
    pub async fn bind_counter_increment(
        &self,
        fqcn: &str,
        primary_key: &[ColumnValue],
        property: &str,
        delta: i64,
        options: WriteOptions,
        context: Option<&FlushContext>,
    ) -> Result<StatementWrapper, MapperError> {
        let meta = self.cache.meta(fqcn)?;
        validate_primary_key(&meta, primary_key)?;
        if !meta.counter_columns.iter().any(|c| c.name == property) {
            return Err(MapperError::Binding(format!(
                "entity '{}' has no counter property '{}'",
                fqcn, property
            )));
        }

        let spec = self.cache.counter_spec(&meta.keyspace);
        let values = vec![
            ColumnValue::Counter(delta),
            ColumnValue::Text(meta.fqcn.clone()),
            ColumnValue::Text(primary_key_as_string(primary_key)),
            ColumnValue::Text(property.to_string()),
        ];
        let context_level = context.and_then(|c| c.write_consistency_level());
        let resolved =
            consistency::resolve(options.consistency, context_level, meta.write_consistency);
        let prepared = self.cache.driver_prepared(&self.session, spec.as_ref()).await?;
        let mut wrapper =
            BoundStatementWrapper::new(prepared, values, resolved, None, self.log.clone())?
                .mark_counter();
        if let Some(listener) = options.listener {
            wrapper = wrapper.with_listener(listener);
        }
        Ok(StatementWrapper::Bound(wrapper))
    }

    async fn assemble(
        &self,
        meta: &EntityMeta,
        spec: &crate::query::PreparedQuerySpec,
        values: Vec<ColumnValue>,
        options: WriteOptions,
        context: Option<&FlushContext>,
    ) -> Result<StatementWrapper, MapperError> {
        let context_level = context.and_then(|c| c.write_consistency_level());
        let resolved =
            consistency::resolve(options.consistency, context_level, meta.write_consistency);
        let prepared = self.cache.driver_prepared(&self.session, spec).await?;
        let mut wrapper = BoundStatementWrapper::new(
            prepared,
            values,
            resolved,
            options.serial_consistency,
            self.log.clone(),
        )?;
        if let Some(listener) = options.listener {
            wrapper = wrapper.with_listener(listener);
        }
        Ok(StatementWrapper::Bound(wrapper))
    }
}

/// Compound keys are rendered as their CQL literal forms joined with `:`.
pub fn primary_key_as_string(primary_key: &[ColumnValue]) -> String {
    primary_key
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(":")
}

fn push_using_values(
    roles: &[BindRole],
    ttl: Option<i32>,
    timestamp: Option<i64>,
    values: &mut Vec<ColumnValue>,
) {
    for role in roles {
        match role {
            BindRole::Ttl => {
                if let Some(ttl) = ttl {
                    values.push(ColumnValue::Int(ttl));
                }
            }
            BindRole::Timestamp => {
                if let Some(ts) = timestamp {
                    values.push(ColumnValue::BigInt(ts));
                }
            }
            _ => {}
        }
    }
}

fn validate_primary_key(meta: &EntityMeta, values: &[ColumnValue]) -> Result<(), MapperError> {
    if values.len() != meta.primary_key_len() {
        return Err(MapperError::Binding(format!(
            "entity '{}' has {} primary key components, {} were bound",
            meta.fqcn,
            meta.primary_key_len(),
            values.len()
        )));
    }
    for (column, value) in meta.primary_key().zip(values.iter()) {
        if value.is_null() {
            return Err(MapperError::Binding(format!(
                "null primary key component '{}' for entity '{}'",
                column.name, meta.fqcn
            )));
        }
        validate_value(meta, column, value)?;
    }
    Ok(())
}

fn validate_columns(meta: &EntityMeta, values: &[ColumnValue]) -> Result<(), MapperError> {
    if values.len() != meta.regular_columns.len() {
        return Err(MapperError::Binding(format!(
            "entity '{}' declares {} columns, {} values were bound",
            meta.fqcn,
            meta.regular_columns.len(),
            values.len()
        )));
    }
    for (column, value) in meta.regular_columns.iter().zip(values.iter()) {
        validate_value(meta, column, value)?;
    }
    Ok(())
}

/// Every bindable column must map onto one of the scalar/list/set/map
/// encoders, and the value must match the declared type. Failures are
/// metadata/programmer errors, reported with the table and column names.
fn validate_value(meta: &EntityMeta, column: &ColumnMeta, value: &ColumnValue) -> Result<(), MapperError> {
    encoder_kind(&column.cql_type).ok_or_else(|| {
        MapperError::Binding(format!(
            "column '{}' of table '{}' has type {} which no encoder can bind",
            column.name,
            meta.qualified_table(),
            column.cql_type
        ))
    })?;
    if !value_matches(&column.cql_type, value) {
        return Err(MapperError::Binding(format!(
            "value {} cannot be bound to column '{}' of table '{}' (declared {})",
            value,
            column.name,
            meta.qualified_table(),
            column.cql_type
        )));
    }
    Ok(())
}

fn encoder_kind(cql_type: &CqlType) -> Option<&'static str> {
    match cql_type {
        CqlType::Counter => None,
        CqlType::List(_) => Some("list"),
        CqlType::Set(_) => Some("set"),
        CqlType::Map(_, _) => Some("map"),
        _ => Some("scalar"),
    }
}

fn value_matches(cql_type: &CqlType, value: &ColumnValue) -> bool {
    match (cql_type, value) {
        (_, ColumnValue::Null) => true,
        (CqlType::Boolean, ColumnValue::Boolean(_)) => true,
        (CqlType::Int, ColumnValue::Int(_)) => true,
        (CqlType::BigInt, ColumnValue::BigInt(_)) => true,
        (CqlType::Float, ColumnValue::Float(_)) => true,
        (CqlType::Double, ColumnValue::Double(_)) => true,
        (CqlType::Text, ColumnValue::Text(_)) => true,
        (CqlType::Blob, ColumnValue::Blob(_)) => true,
        (CqlType::Uuid, ColumnValue::Uuid(_)) => true,
        (CqlType::Timestamp, ColumnValue::Timestamp(_)) => true,
        (CqlType::List(inner), ColumnValue::List(items)) => {
            items.iter().all(|item| value_matches(inner, item))
        }
        (CqlType::Set(inner), ColumnValue::Set(items)) => {
            items.iter().all(|item| value_matches(inner, item))
        }
        (CqlType::Map(key, val), ColumnValue::Map(pairs)) => pairs
            .iter()
            .all(|(k, v)| value_matches(key, k) && value_matches(val, v)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingSession;
    use crate::types::ConsistencyLevel::*;

    fn meta() -> EntityMeta {
        EntityMeta {
            fqcn: "com.acme.model.User".to_string(),
            keyspace: "acme".to_string(),
            table: "users".to_string(),
            partition_key: vec![ColumnMeta::new("id", CqlType::BigInt)],
            clustering_key: vec![],
            regular_columns: vec![
                ColumnMeta::new("name", CqlType::Text),
                ColumnMeta::new("age", CqlType::Int),
            ],
            counter_columns: vec![ColumnMeta::new("logins", CqlType::Counter)],
            read_consistency: Some(One),
            write_consistency: Some(One),
        }
    }

    fn binder() -> Binder {
        let cache = Arc::new(PreparedQueryCache::new());
        cache.register(meta()).unwrap();
        let session: Arc<dyn CqlSession> = RecordingSession::new();
        Binder::new(cache, session, DmlLogConfig::default())
    }

    #[tokio::test]
    async fn test_insert_binds_ttl_then_timestamp_last() {
        let binder = binder();
        let wrapper = binder
            .bind_insert(
                "com.acme.model.User",
                &[ColumnValue::BigInt(1)],
                &[ColumnValue::Text("ada".to_string()), ColumnValue::Int(36)],
                WriteOptions { ttl: Some(115), timestamp: Some(115), ..Default::default() },
                None,
            )
            .await
            .unwrap();

        assert!(wrapper.query_string().ends_with("USING TTL ? AND TIMESTAMP ?"));
        let values = wrapper.bound_values();
        assert_eq!(values[0], ColumnValue::BigInt(1));
        // The timestamp marker binds last; with TTL and timestamp both 115
        // the tail is [Int(115), BigInt(115)].
        assert_eq!(values[values.len() - 2], ColumnValue::Int(115));
        assert_eq!(values[values.len() - 1], ColumnValue::BigInt(115));
    }

    #[tokio::test]
    async fn test_update_binds_timestamp_first_then_ttl() {
        let binder = binder();
        let wrapper = binder
            .bind_update(
                "com.acme.model.User",
                &[("name".to_string(), ColumnValue::Text("grace".to_string()))],
                &[ColumnValue::BigInt(1)],
                WriteOptions { ttl: Some(54321), timestamp: Some(15465), ..Default::default() },
                None,
            )
            .await
            .unwrap();

        assert!(wrapper.query_string().contains("USING TIMESTAMP ? AND TTL ?"));
        let values = wrapper.bound_values();
        assert_eq!(values[0], ColumnValue::BigInt(15465));
        assert_eq!(values[1], ColumnValue::Int(54321));
    }

    #[tokio::test]
    async fn test_consistency_resolution_layers() {
        let binder = binder();
        let session: Arc<dyn CqlSession> = RecordingSession::new();
        let mut context = FlushContext::immediate(session, DmlLogConfig::default());
        context.set_read_consistency_level(Quorum);

        // Entity default only.
        let wrapper = binder
            .bind_select("com.acme.model.User", &[ColumnValue::BigInt(1)], None, None)
            .await
            .unwrap();
        assert_eq!(wrapper.statement().unwrap().consistency(), Some(One));

        // Context override beats the entity default.
        let wrapper = binder
            .bind_select("com.acme.model.User", &[ColumnValue::BigInt(1)], None, Some(&context))
            .await
            .unwrap();
        assert_eq!(wrapper.statement().unwrap().consistency(), Some(Quorum));

        // Per-call override beats both.
        let wrapper = binder
            .bind_select(
                "com.acme.model.User",
                &[ColumnValue::BigInt(1)],
                Some(All),
                Some(&context),
            )
            .await
            .unwrap();
        assert_eq!(wrapper.statement().unwrap().consistency(), Some(All));
    }

    #[tokio::test]
    async fn test_context_ttl_inherited_and_cleared_by_duplicate() {
        let binder = binder();
        let session: Arc<dyn CqlSession> = RecordingSession::new();
        let mut context = FlushContext::immediate(session, DmlLogConfig::default());
        context.set_ttl(600);

        let wrapper = binder
            .bind_insert(
                "com.acme.model.User",
                &[ColumnValue::BigInt(1)],
                &[ColumnValue::Text("ada".to_string()), ColumnValue::Int(36)],
                WriteOptions::default(),
                Some(&context),
            )
            .await
            .unwrap();
        assert!(wrapper.query_string().ends_with("USING TTL ?"));
        assert_eq!(wrapper.bound_values().last(), Some(&ColumnValue::Int(600)));

        // A cascading write through the duplicated context loses the TTL.
        let child = context.duplicate_without_ttl();
        let wrapper = binder
            .bind_insert(
                "com.acme.model.User",
                &[ColumnValue::BigInt(1)],
                &[ColumnValue::Text("ada".to_string()), ColumnValue::Int(36)],
                WriteOptions::default(),
                Some(&child),
            )
            .await
            .unwrap();
        assert!(!wrapper.query_string().contains("USING TTL"));
    }

    #[tokio::test]
    async fn test_counter_increment_addressing_values() {
        let binder = binder();
        let wrapper = binder
            .bind_counter_increment(
                "com.acme.model.User",
                &[ColumnValue::BigInt(7)],
                "logins",
                3,
                WriteOptions::default(),
                None,
            )
            .await
            .unwrap();

        assert!(wrapper.is_counter());
        assert_eq!(
            wrapper.bound_values(),
            vec![
                ColumnValue::Counter(3),
                ColumnValue::Text("com.acme.model.User".to_string()),
                ColumnValue::Text("7".to_string()),
                ColumnValue::Text("logins".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_counter_property_rejected() {
        let binder = binder();
        let err = binder
            .bind_counter_increment(
                "com.acme.model.User",
                &[ColumnValue::BigInt(7)],
                "clicks",
                1,
                WriteOptions::default(),
                None,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("clicks"));
    }

    #[tokio::test]
    async fn test_delete_unknown_table_names_the_table() {
        let binder = binder();
        let err = binder
            .bind_delete(
                "com.acme.model.User",
                "users_by_email",
                &[ColumnValue::BigInt(1)],
                WriteOptions::default(),
                None,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("users_by_email"));
    }

    #[tokio::test]
    async fn test_null_primary_key_component_rejected() {
        let binder = binder();
        let err = binder
            .bind_select("com.acme.model.User", &[ColumnValue::Null], None, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("null primary key"));
    }

    #[tokio::test]
    async fn test_type_mismatch_names_column_and_table() {
        let binder = binder();
        let err = binder
            .bind_insert(
                "com.acme.model.User",
                &[ColumnValue::BigInt(1)],
                &[ColumnValue::Int(5), ColumnValue::Int(36)],
                WriteOptions::default(),
                None,
            )
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'name'"));
        assert!(message.contains("acme.users"));
    }

    #[tokio::test]
    async fn test_unknown_update_column_rejected() {
        let binder = binder();
        let err = binder
            .bind_update(
                "com.acme.model.User",
                &[("email".to_string(), ColumnValue::Text("a@b".to_string()))],
                &[ColumnValue::BigInt(1)],
                WriteOptions::default(),
                None,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("email"));
    }

    #[test]
    fn test_counter_type_has_no_dml_encoder() {
        let meta = meta();
        let column = ColumnMeta::new("logins", CqlType::Counter);
        let err = validate_value(&meta, &column, &ColumnValue::Counter(1)).unwrap_err();
        assert!(err.to_string().contains("no encoder"));
    }

    #[test]
    fn test_compound_key_string() {
        let key = vec![ColumnValue::BigInt(7), ColumnValue::Text("b".to_string())];
        assert_eq!(primary_key_as_string(&key), "7:'b'");
    }

    #[tokio::test]
    async fn test_same_spec_prepared_once() {
        let cache = Arc::new(PreparedQueryCache::new());
        cache.register(meta()).unwrap();
        let session = RecordingSession::new();
        let as_dyn: Arc<dyn CqlSession> = session.clone();
        let binder = Binder::new(cache, as_dyn, DmlLogConfig::default());

        for _ in 0..3 {
            binder
                .bind_select("com.acme.model.User", &[ColumnValue::BigInt(1)], None, None)
                .await
                .unwrap();
        }
        assert_eq!(session.prepared.lock().len(), 1);
    }
}
