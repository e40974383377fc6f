//! Conditional-statement (lightweight transaction) result handling.
//!
//! Any statement whose text carries a conditional clause returns a single
//! row with the fixed `[applied]` boolean. When the write did not apply,
//! the row also carries the live column values; those are packaged into an
//! [`LwtOutcome`] and routed to the registered listener, or raised as an
//! error when nobody is listening. A failed conditional write must never
//! pass unnoticed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::errors::MapperError;
use crate::metadata::APPLIED_COLUMN;
use crate::metrics;
use crate::types::{ColumnValue, ResultSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LwtOperation {
    Insert,
    Update,
}

impl fmt::Display for LwtOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LwtOperation::Insert => write!(f, "INSERT"),
            LwtOperation::Update => write!(f, "UPDATE"),
        }
    }
}

/// The live row of a conditional statement that did not apply, in result
/// schema order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LwtOutcome {
    pub operation: LwtOperation,
    pub current_values: Vec<(String, ColumnValue)>,
}

impl LwtOutcome {
    pub fn value(&self, column: &str) -> Option<&ColumnValue> {
        self.current_values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn describe_columns(&self) -> String {
        self.current_values
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Callback contract for conditional results. Success notification is
/// optional; conflict handling is the reason to register one.
pub trait LwtListener: Send + Sync {
    fn on_applied(&self) {}

    fn on_conflict(&self, outcome: LwtOutcome);
}

/// Fans a batch's conditional outcome out to every distinct child listener.
pub struct CompositeLwtListener {
    delegates: Vec<Arc<dyn LwtListener>>,
}

impl CompositeLwtListener {
    /// Duplicate registrations of the same listener collapse to one.
    pub fn new(listeners: Vec<Arc<dyn LwtListener>>) -> Self {
        let mut delegates: Vec<Arc<dyn LwtListener>> = Vec::new();
        for listener in listeners {
            let duplicate = delegates
                .iter()
                .any(|existing| Arc::ptr_eq(existing, &listener));
            if !duplicate {
                delegates.push(listener);
            }
        }
        Self { delegates }
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.delegates.len()
    }
}

impl LwtListener for CompositeLwtListener {
    fn on_applied(&self) {
        for delegate in &self.delegates {
            delegate.on_applied();
        }
    }

    fn on_conflict(&self, outcome: LwtOutcome) {
        for delegate in &self.delegates {
            delegate.on_conflict(outcome.clone());
        }
    }
}

/// Classifies a query's conditional clause: `IF NOT EXISTS` marks an
/// insert-kind condition, any other ` IF ` clause an update-kind one.
pub fn conditional_kind(query: &str) -> Option<LwtOperation> {
    let upper = query.to_uppercase();
    if upper.contains("IF NOT EXISTS") {
        Some(LwtOperation::Insert)
    } else if upper.contains(" IF ") {
        Some(LwtOperation::Update)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LwtStatus {
    /// The statement carries no conditional clause; nothing to inspect.
    NotConditional,
    Applied,
    /// The write did not apply and the registered listener received the
    /// outcome.
    ConflictNotified,
}

/// Inspects the result of a statement. Non-conditional statements pass
/// through untouched. For conditional ones the `[applied]` column decides:
/// applied invokes the optional success callback; not applied builds the
/// outcome from the live row and either hands it to the listener or raises.
pub fn check(
    query: &str,
    listener: Option<&Arc<dyn LwtListener>>,
    result: &ResultSet,
) -> Result<LwtStatus, MapperError> {
    let Some(operation) = conditional_kind(query) else {
        return Ok(LwtStatus::NotConditional);
    };
    let Some(applied_idx) = result.column_index(APPLIED_COLUMN) else {
        // The server only omits the applied column when the write went
        // through a non-conditional path; treat it as applied.
        return Ok(LwtStatus::Applied);
    };
    let Some(row) = result.rows.first() else {
        return Ok(LwtStatus::Applied);
    };

    if row.get(applied_idx) == Some(&ColumnValue::Boolean(true)) {
        if let Some(listener) = listener {
            listener.on_applied();
        }
        return Ok(LwtStatus::Applied);
    }

    let current_values: Vec<(String, ColumnValue)> = result
        .columns
        .iter()
        .enumerate()
        .filter(|(_, column)| column.name != APPLIED_COLUMN)
        .map(|(idx, column)| {
            (
                column.name.clone(),
                row.get(idx).cloned().unwrap_or(ColumnValue::Null),
            )
        })
        .collect();
    metrics::record_lwt_conflict(&operation.to_string());
    let outcome = LwtOutcome { operation, current_values };

    match listener {
        Some(listener) => {
            listener.on_conflict(outcome);
            Ok(LwtStatus::ConflictNotified)
        }
        None => Err(MapperError::Conflict { outcome }),
    }
}
