use thiserror::Error;

use crate::lwt::LwtOutcome;

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Binding error: {0}")]
    Binding(String),

    /// A conditional statement did not apply and no listener was registered
    /// to receive the outcome.
    #[error("Conditional {} did not apply; current values: {}", outcome.operation, outcome.describe_columns())]
    Conflict { outcome: LwtOutcome },

    #[error("Illegal flush state: {0}")]
    IllegalState(String),

    #[error("Trace error: {0}")]
    Trace(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<scylla::transport::errors::QueryError> for MapperError {
    fn from(err: scylla::transport::errors::QueryError) -> Self {
        MapperError::Database(err.to_string())
    }
}

impl From<anyhow::Error> for MapperError {
    fn from(err: anyhow::Error) -> Self {
        MapperError::Unknown(err.to_string())
    }
}
