//! Query generation, caching, and value binding.

pub mod binder;
pub mod cache;
pub mod generator;

use serde::{Deserialize, Serialize};

/// The role of one positional bind marker in a generated query, in marker
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BindRole {
    PartitionKey(String),
    ClusteringKey(String),
    Column(String),
    Ttl,
    Timestamp,
    CounterDelta,
    CounterFqcn,
    CounterPrimaryKey,
    CounterPropertyName,
}

/// The cached product of query generation for one (entity, operation) pair:
/// the parameterized text plus the ordered roles of its bind markers.
/// Created once and reused for the process lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuerySpec {
    pub query: String,
    pub roles: Vec<BindRole>,
}

impl PreparedQuerySpec {
    pub fn bind_count(&self) -> usize {
        self.roles.len()
    }

    /// True when this spec mutates a counter; such statements may only join
    /// COUNTER batches.
    pub fn is_counter(&self) -> bool {
        self.roles.iter().any(|r| matches!(r, BindRole::CounterDelta))
    }
}
