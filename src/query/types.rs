//! Query and result types.
//!
//! A `Record` is an insertion-ordered map from column name to a JSON scalar, so
//! column order survives parsing and re-serialization.

use serde::Serialize;
use serde_json::{Map, Value};

/// One result row keyed by column name.
pub type Record = Map<String, Value>;

/// Whether a query is expected to produce rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// No rows expected, e.g. a registry mutation.
    Statement,
    /// Rows expected.
    Query,
}

/// An immutable piece of StackQL text tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    kind: QueryKind,
}

impl Query {
    /// Creates a row-producing query.
    pub fn query(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: QueryKind::Query,
        }
    }

    /// Creates a statement that produces no rows.
    pub fn statement(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: QueryKind::Statement,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }
}

/// Transport output before parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    /// Captured standard output of the runtime.
    Text(String),
    /// Rows decoded by the wire protocol driver.
    Rows(Vec<Record>),
}

/// The outcome of a query.
///
/// Structured formats yield records; presentation formats yield the text the
/// runtime printed. An empty result is an empty record list, never absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Records(Vec<Record>),
    Text(String),
}

impl QueryResult {
    /// Returns the records, or `None` for text results.
    pub fn records(&self) -> Option<&[Record]> {
        match self {
            Self::Records(records) => Some(records),
            Self::Text(_) => None,
        }
    }

    /// Consumes the result, returning its records if it has any structure.
    pub fn into_records(self) -> Option<Vec<Record>> {
        match self {
            Self::Records(records) => Some(records),
            Self::Text(_) => None,
        }
    }

    /// Returns the raw text, or `None` for record results.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Records(_) => None,
            Self::Text(text) => Some(text),
        }
    }

    /// Number of records (0 for text results).
    pub fn len(&self) -> usize {
        self.records().map_or(0, <[Record]>::len)
    }

    /// Returns true if there are no records or the text is blank.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Records(records) => records.is_empty(),
            Self::Text(text) => text.trim().is_empty(),
        }
    }
}
