//! StackQL client - run StackQL queries through a spawned runtime or a server.
//!
//! This library exposes the core modules to the binary and integration tests.

pub mod binary;
pub mod config;
pub mod error;
pub mod logging;
pub mod query;
pub mod transport;

pub use config::{Config, OutputFormat};
pub use error::{ClientError, Result};
pub use query::{QueryExecutor, QueryResult, Record, Session};
