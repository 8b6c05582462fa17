//! Query execution and result handling.
//!
//! The executor is the façade callers use; the parser turns raw runtime output
//! into records.

pub mod executor;
pub mod parser;
mod types;

pub use executor::{QueryExecutor, Session, SessionProperties};
pub use types::{Query, QueryKind, QueryResult, RawOutput, Record};
