use crate::metadata::{
    EntityMeta, COUNTER_FQCN_COLUMN, COUNTER_PRIMARY_KEY_COLUMN, COUNTER_PROPERTY_NAME_COLUMN,
    COUNTER_TABLE, COUNTER_VALUE_COLUMN,
};
use crate::query::{BindRole, PreparedQuerySpec};

/// Generates the parameterized CQL text for the mapped operations. Every
/// value position is a bind marker; the returned roles follow marker order
/// exactly.
pub struct QueryGenerator;

impl QueryGenerator {
    /// `INSERT INTO ks.tab (pk…, ck…, cols…) VALUES (?, …)` with the
    /// optional `IF NOT EXISTS` and trailing `USING TTL ? AND TIMESTAMP ?`.
    /// Primary-key markers come first, payload columns next, TTL and
    /// timestamp last.
    pub fn insert(meta: &EntityMeta, if_not_exists: bool, ttl: bool, timestamp: bool) -> PreparedQuerySpec {
        let mut names: Vec<String> = Vec::new();
        let mut roles: Vec<BindRole> = Vec::new();

        for column in &meta.partition_key {
            names.push(column.name.clone());
            roles.push(BindRole::PartitionKey(column.name.clone()));
        }
        for column in &meta.clustering_key {
            names.push(column.name.clone());
            roles.push(BindRole::ClusteringKey(column.name.clone()));
        }
        for column in &meta.regular_columns {
            names.push(column.name.clone());
            roles.push(BindRole::Column(column.name.clone()));
        }

        let markers = vec!["?"; names.len()].join(", ");
        let mut query = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            meta.qualified_table(),
            names.join(", "),
            markers
        );
        if if_not_exists {
            query.push_str(" IF NOT EXISTS");
        }
        match (ttl, timestamp) {
            (true, true) => {
                query.push_str(" USING TTL ? AND TIMESTAMP ?");
                roles.push(BindRole::Ttl);
                roles.push(BindRole::Timestamp);
            }
            (true, false) => {
                query.push_str(" USING TTL ?");
                roles.push(BindRole::Ttl);
            }
            (false, true) => {
                query.push_str(" USING TIMESTAMP ?");
                roles.push(BindRole::Timestamp);
            }
            (false, false) => {}
        }

        PreparedQuerySpec { query, roles }
    }

    /// `UPDATE ks.tab USING TIMESTAMP ? AND TTL ? SET col = ?, … WHERE pk =
    /// ? AND …`. The USING clauses keep the fixed order TIMESTAMP first,
    /// TTL second; bind roles follow marker positions.
    pub fn update(meta: &EntityMeta, changed: &[String], ttl: bool, timestamp: bool) -> PreparedQuerySpec {
        let mut roles: Vec<BindRole> = Vec::new();
        let mut query = format!("UPDATE {}", meta.qualified_table());

        match (timestamp, ttl) {
            (true, true) => {
                query.push_str(" USING TIMESTAMP ? AND TTL ?");
                roles.push(BindRole::Timestamp);
                roles.push(BindRole::Ttl);
            }
            (true, false) => {
                query.push_str(" USING TIMESTAMP ?");
                roles.push(BindRole::Timestamp);
            }
            (false, true) => {
                query.push_str(" USING TTL ?");
                roles.push(BindRole::Ttl);
            }
            (false, false) => {}
        }

        let set_clause: Vec<String> = changed.iter().map(|name| format!("{} = ?", name)).collect();
        query.push_str(&format!(" SET {}", set_clause.join(", ")));
        for name in changed {
            roles.push(BindRole::Column(name.clone()));
        }

        query.push_str(&format!(" WHERE {}", Self::primary_key_clause(meta, &mut roles)));
        PreparedQuerySpec { query, roles }
    }

    /// Point select by full primary key; the select list is the primary key
    /// followed by the regular columns in declared order.
    pub fn select(meta: &EntityMeta) -> PreparedQuerySpec {
        let mut roles: Vec<BindRole> = Vec::new();
        let select_list: Vec<String> = meta
            .primary_key()
            .chain(meta.regular_columns.iter())
            .map(|c| c.name.clone())
            .collect();
        let mut query = format!(
            "SELECT {} FROM {} WHERE ",
            select_list.join(", "),
            meta.qualified_table()
        );
        query.push_str(&Self::primary_key_clause(meta, &mut roles));
        PreparedQuerySpec { query, roles }
    }

    /// Point delete by full primary key.
    pub fn delete(meta: &EntityMeta) -> PreparedQuerySpec {
        let mut roles: Vec<BindRole> = Vec::new();
        let mut query = format!("DELETE FROM {} WHERE ", meta.qualified_table());
        query.push_str(&Self::primary_key_clause(meta, &mut roles));
        PreparedQuerySpec { query, roles }
    }

    /// Counter mutation against the fixed side table. Binds exactly the
    /// delta followed by the three addressing values.
    pub fn counter_increment(keyspace: &str) -> PreparedQuerySpec {
        let query = format!(
            "UPDATE {}.{} SET {} = {} + ? WHERE {} = ? AND {} = ? AND {} = ?",
            keyspace,
            COUNTER_TABLE,
            COUNTER_VALUE_COLUMN,
            COUNTER_VALUE_COLUMN,
            COUNTER_FQCN_COLUMN,
            COUNTER_PRIMARY_KEY_COLUMN,
            COUNTER_PROPERTY_NAME_COLUMN,
        );
        PreparedQuerySpec {
            query,
            roles: vec![
                BindRole::CounterDelta,
                BindRole::CounterFqcn,
                BindRole::CounterPrimaryKey,
                BindRole::CounterPropertyName,
            ],
        }
    }

    fn primary_key_clause(meta: &EntityMeta, roles: &mut Vec<BindRole>) -> String {
        let mut parts: Vec<String> = Vec::new();
        for column in &meta.partition_key {
            parts.push(format!("{} = ?", column.name));
            roles.push(BindRole::PartitionKey(column.name.clone()));
        }
        for column in &meta.clustering_key {
            parts.push(format!("{} = ?", column.name));
            roles.push(BindRole::ClusteringKey(column.name.clone()));
        }
        parts.join(" AND ")
    }
}

/// Counts positional bind markers, skipping `?` inside single-quoted string
/// literals.
pub fn count_bind_markers(query: &str) -> usize {
    let mut count = 0;
    let mut in_literal = false;
    for c in query.chars() {
        match c {
            '\'' => in_literal = !in_literal,
            '?' if !in_literal => count += 1,
            _ => {}
        }
    }
    count
}
