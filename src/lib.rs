//! Execution core for a CQL object mapper.
//!
//! Turns logical persist/read operations into wire-level statements,
//! decides how and when they are sent, resolves the effective consistency
//! level, and interprets conditional (LWT) results. The crate assumes an
//! already-connected session ([`session::CqlSession`]); transcoding, code
//! generation, schema DDL and entity reflection are external collaborators.
//!
//! The moving parts:
//! * [`statement`]: the four statement shapes behind one contract
//! * [`flush`]: pending-statement queues in immediate or batch mode
//! * [`query`]: query generation, spec caching, and value binding
//! * [`consistency`]: three-layer consistency resolution
//! * [`lwt`]: conditional-result inspection and listener routing
//! * [`tracer`]: per-host execution traces

pub mod config;
pub mod consistency;
pub mod errors;
pub mod flush;
pub mod lwt;
pub mod metadata;
pub mod metrics;
pub mod query;
pub mod retry;
pub mod session;
pub mod statement;
pub mod tracer;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{DatabaseConfig, DmlLogConfig};
pub use errors::MapperError;
pub use flush::{FlushContext, FlushMode};
pub use lwt::{LwtListener, LwtOutcome, LwtStatus};
pub use metadata::{ColumnMeta, EntityMeta};
pub use query::binder::{Binder, WriteOptions};
pub use query::cache::PreparedQueryCache;
pub use session::{CqlSession, CqlStatement, SimpleStatement};
pub use statement::StatementWrapper;
pub use types::{BatchKind, ColumnValue, ConsistencyLevel, CqlType, ResultSet};
