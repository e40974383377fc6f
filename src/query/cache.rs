use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::errors::MapperError;
use crate::metadata::EntityMeta;
use crate::query::generator::QueryGenerator;
use crate::query::PreparedQuerySpec;
use crate::session::{CqlSession, PreparedSpec};

/// Process-lifetime cache of generated query specs and driver-side prepared
/// statements.
///
/// Spec generation is keyed by (entity fqcn, operation shape) and populated
/// through the map's entry API, so two concurrent callers can never generate
/// diverging text for the same key. Driver preparation is memoized per query
/// text through an async once-cell: the first caller prepares, everyone else
/// awaits the same handle.
pub struct PreparedQueryCache {
    entities: DashMap<String, Arc<EntityMeta>>,
    specs: DashMap<(String, String), Arc<PreparedQuerySpec>>,
    delete_specs: DashMap<(String, String), Arc<PreparedQuerySpec>>,
    prepared: DashMap<String, Arc<OnceCell<Arc<PreparedSpec>>>>,
}

impl PreparedQueryCache {
    pub fn new() -> Self {
        Self {
            entities: DashMap::new(),
            specs: DashMap::new(),
            delete_specs: DashMap::new(),
            prepared: DashMap::new(),
        }
    }

    /// Validates and registers an entity descriptor. The point-delete spec
    /// for the entity's table is generated here; delete requests against any
    /// other table fail with a binding error.
    pub fn register(&self, meta: EntityMeta) -> Result<(), MapperError> {
        meta.validate()?;
        let fqcn = meta.fqcn.clone();
        let delete = Arc::new(QueryGenerator::delete(&meta));
        self.delete_specs.insert((fqcn.clone(), meta.table.clone()), delete);
        debug!("Registered entity '{}' for table {}", fqcn, meta.qualified_table());
        self.entities.insert(fqcn, Arc::new(meta));
        Ok(())
    }

    pub fn meta(&self, fqcn: &str) -> Result<Arc<EntityMeta>, MapperError> {
        self.entities
            .get(fqcn)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| MapperError::Binding(format!("entity '{}' is not registered", fqcn)))
    }

    pub fn insert_spec(
        &self,
        fqcn: &str,
        if_not_exists: bool,
        ttl: bool,
        timestamp: bool,
    ) -> Result<Arc<PreparedQuerySpec>, MapperError> {
        let meta = self.meta(fqcn)?;
        let key = format!("insert:{}:{}:{}", if_not_exists, ttl, timestamp);
        Ok(self
            .specs
            .entry((fqcn.to_string(), key))
            .or_insert_with(|| Arc::new(QueryGenerator::insert(&meta, if_not_exists, ttl, timestamp)))
            .value()
            .clone())
    }

    pub fn update_spec(
        &self,
        fqcn: &str,
        changed: &[String],
        ttl: bool,
        timestamp: bool,
    ) -> Result<Arc<PreparedQuerySpec>, MapperError> {
        let meta = self.meta(fqcn)?;
        let key = format!("update:{}:{}:{}", changed.join(","), ttl, timestamp);
        Ok(self
            .specs
            .entry((fqcn.to_string(), key))
            .or_insert_with(|| Arc::new(QueryGenerator::update(&meta, changed, ttl, timestamp)))
            .value()
            .clone())
    }

    pub fn select_spec(&self, fqcn: &str) -> Result<Arc<PreparedQuerySpec>, MapperError> {
        let meta = self.meta(fqcn)?;
        Ok(self
            .specs
            .entry((fqcn.to_string(), "select".to_string()))
            .or_insert_with(|| Arc::new(QueryGenerator::select(&meta)))
            .value()
            .clone())
    }

    /// Point-delete spec for a specific table. The table must be one the
    /// entity was registered against.
    pub fn delete_spec(&self, fqcn: &str, table: &str) -> Result<Arc<PreparedQuerySpec>, MapperError> {
        self.meta(fqcn)?;
        self.delete_specs
            .get(&(fqcn.to_string(), table.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                MapperError::Binding(format!(
                    "no delete statement prepared for table '{}' of entity '{}'",
                    table, fqcn
                ))
            })
    }

    pub fn counter_spec(&self, keyspace: &str) -> Arc<PreparedQuerySpec> {
        self.specs
            .entry(("__counter__".to_string(), keyspace.to_string()))
            .or_insert_with(|| Arc::new(QueryGenerator::counter_increment(keyspace)))
            .value()
            .clone()
    }

    /// Prepares a spec on the session exactly once per query text.
    pub async fn driver_prepared(
        &self,
        session: &Arc<dyn CqlSession>,
        spec: &PreparedQuerySpec,
    ) -> Result<Arc<PreparedSpec>, MapperError> {
        let cell = self
            .prepared
            .entry(spec.query.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();
        cell.get_or_try_init(|| async { session.prepare(&spec.query).await })
            .await
            .cloned()
    }
}

impl Default for PreparedQueryCache {
    fn default() -> Self {
        Self::new()
    }
}
