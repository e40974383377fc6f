use serde::{Deserialize, Serialize};

use crate::errors::MapperError;
use crate::types::{ConsistencyLevel, CqlType};

/// Fixed side table through which all counter mutations are routed. Counters
/// are addressed by (entity fqcn, primary-key-as-string, property name)
/// rather than through the entity's own table.
pub const COUNTER_TABLE: &str = "entity_counters";
pub const COUNTER_FQCN_COLUMN: &str = "fqcn";
pub const COUNTER_PRIMARY_KEY_COLUMN: &str = "primary_key";
pub const COUNTER_PROPERTY_NAME_COLUMN: &str = "property_name";
pub const COUNTER_VALUE_COLUMN: &str = "value";

/// Fixed name of the boolean column carried by conditional-statement
/// results.
pub const APPLIED_COLUMN: &str = "[applied]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub cql_type: CqlType,
}

impl ColumnMeta {
    pub fn new(name: &str, cql_type: CqlType) -> Self {
        Self { name: name.to_string(), cql_type }
    }
}

/// Schema descriptor for one mapped entity, resolved once at registration
/// time. Ordering matters everywhere: compound primary keys bind partition
/// components first, then clustering components, and payload columns bind
/// in declared order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMeta {
    /// Fully-qualified logical entity name; keys the counter side table and
    /// the prepared-query cache.
    pub fqcn: String,
    pub keyspace: String,
    pub table: String,
    pub partition_key: Vec<ColumnMeta>,
    pub clustering_key: Vec<ColumnMeta>,
    pub regular_columns: Vec<ColumnMeta>,
    pub counter_columns: Vec<ColumnMeta>,
    /// Static consistency defaults declared on the entity; the lowest
    /// precedence layer of consistency resolution.
    pub read_consistency: Option<ConsistencyLevel>,
    pub write_consistency: Option<ConsistencyLevel>,
}

impl EntityMeta {
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.keyspace, self.table)
    }

    /// Partition components followed by clustering components.
    pub fn primary_key(&self) -> impl Iterator<Item = &ColumnMeta> {
        self.partition_key.iter().chain(self.clustering_key.iter())
    }

    pub fn primary_key_len(&self) -> usize {
        self.partition_key.len() + self.clustering_key.len()
    }

    /// Registration-time sanity check. Failures here are programmer or
    /// metadata errors, never runtime data errors.
    pub fn validate(&self) -> Result<(), MapperError> {
        if self.partition_key.is_empty() {
            return Err(MapperError::Binding(format!(
                "entity '{}' declares no partition key for table '{}'",
                self.fqcn, self.table
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for column in self
            .primary_key()
            .chain(self.regular_columns.iter())
            .chain(self.counter_columns.iter())
        {
            if !seen.insert(column.name.as_str()) {
                return Err(MapperError::Binding(format!(
                    "entity '{}' declares column '{}' more than once",
                    self.fqcn, column.name
                )));
            }
        }
        for column in self.primary_key().chain(self.regular_columns.iter()) {
            if column.cql_type == CqlType::Counter {
                return Err(MapperError::Binding(format!(
                    "entity '{}' declares non-counter column '{}' with counter type",
                    self.fqcn, column.name
                )));
            }
        }
        for column in &self.counter_columns {
            if column.cql_type != CqlType::Counter {
                return Err(MapperError::Binding(format!(
                    "entity '{}' declares counter column '{}' with type {}",
                    self.fqcn, column.name, column.cql_type
                )));
            }
        }
        Ok(())
    }
}
