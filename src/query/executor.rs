//! Query execution façade.
//!
//! A `QueryExecutor` (aliased as `Session`) owns the single transport chosen
//! for its configuration and routes statements, queries and batches to it.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::parser;
use super::types::{Query, QueryResult, RawOutput, Record};
use crate::binary::{BinaryInfo, BinaryManager, InstalledBinary};
use crate::config::{Config, OutputFormat};
use crate::error::{ClientError, Result};
use crate::transport::{self, ProcessTransport, Transport, TransportKind};

/// Executes queries through one transport for the lifetime of the session.
#[derive(Debug)]
pub struct QueryExecutor {
    config: Config,
    transport: Arc<Transport>,
}

/// A configured, connected executor.
pub type Session = QueryExecutor;

impl QueryExecutor {
    /// Validates `config` and builds its transport, resolving the executable
    /// from `binary_path` or `download_dir` in process mode.
    pub async fn new(config: Config) -> Result<Self> {
        let binaries = match &config.binary_path {
            Some(path) => InstalledBinary::at(path.clone()),
            None => InstalledBinary::new(),
        };
        Self::with_binary_manager(config, &binaries).await
    }

    /// Like [`QueryExecutor::new`], resolving the executable through `binaries`.
    pub async fn with_binary_manager(config: Config, binaries: &dyn BinaryManager) -> Result<Self> {
        config.validate()?;
        let transport = transport::select(&config, binaries).await?;
        Ok(Self {
            config,
            transport: Arc::new(transport),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// The resolved executable (process mode only).
    pub fn binary(&self) -> Option<&BinaryInfo> {
        match self.transport.as_ref() {
            Transport::Process(process) => Some(process.binary()),
            Transport::Connection(_) => None,
        }
    }

    /// Runs a statement and returns the response text verbatim.
    pub async fn execute_statement(&self, query: &str) -> Result<String> {
        let start = Instant::now();
        let output = self.transport.run_statement(&Query::statement(query)).await?;
        debug!("Statement completed in {:?}", start.elapsed());
        Ok(output)
    }

    /// Runs a query and parses its output according to the session's format.
    pub async fn execute(&self, query: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let result = execute_on(&self.transport, &Query::query(query), self.config.output).await?;
        debug!(
            "Query returned {} records in {:?}",
            result.len(),
            start.elapsed()
        );
        Ok(result)
    }

    /// Runs every query concurrently and concatenates their records.
    ///
    /// Each query's rows keep their order and are grouped per query; no
    /// ordering across queries is promised. Any failing member fails the
    /// whole batch. Process-mode members still running are killed;
    /// connection-mode members are left to finish so the shared connection
    /// is not abandoned mid round trip.
    pub async fn execute_batch<I, S>(&self, queries: I) -> Result<QueryResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let format = self.config.output;
        if !format.is_structured() {
            return Err(ClientError::unsupported_format(format!(
                "batch execution requires json output, session uses {format}"
            )));
        }

        let queries: Vec<Query> = queries.into_iter().map(Query::query).collect();
        let total = queries.len();
        if total == 0 {
            return Ok(QueryResult::Records(Vec::new()));
        }

        let start = Instant::now();
        let limiter = self
            .config
            .max_concurrency
            .map(|permits| Arc::new(Semaphore::new(permits)));

        let mut tasks = JoinSet::new();
        for (index, query) in queries.into_iter().enumerate() {
            let transport = Arc::clone(&self.transport);
            let limiter = limiter.clone();
            tasks.spawn(async move {
                let _permit = match limiter {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                (index, execute_on(&transport, &query, format).await)
            });
        }

        let abort_on_failure = self.transport.kind() == TransportKind::Process;
        let mut slots: Vec<Vec<Record>> = vec![Vec::new(); total];
        let mut failure: Option<ClientError> = None;

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok((index, Ok(result))) => {
                    slots[index] = result.into_records().unwrap_or_default();
                    continue;
                }
                Ok((index, Err(e))) => {
                    warn!("Batch query {} of {} failed: {}", index + 1, total, e);
                    e
                }
                Err(e) if e.is_cancelled() => continue,
                Err(e) => ClientError::internal(format!("Batch task panicked: {e}")),
            };

            if failure.is_none() {
                if abort_on_failure {
                    tasks.abort_all();
                }
                failure = Some(outcome);
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        let records: Vec<Record> = slots.into_iter().flatten().collect();
        debug!(
            "Batch of {} queries returned {} records in {:?}",
            total,
            records.len(),
            start.elapsed()
        );
        Ok(QueryResult::Records(records))
    }

    /// Snapshot of the session for display.
    pub fn properties(&self) -> SessionProperties {
        let (binary, params, server) = match self.transport.as_ref() {
            Transport::Process(process) => (
                Some(process.binary().clone()),
                Some(process.params().to_vec()),
                None,
            ),
            Transport::Connection(connection) => {
                (None, None, Some(connection.server().display_string()))
            }
        };

        SessionProperties {
            package_version: env!("CARGO_PKG_VERSION"),
            transport: self.transport.kind(),
            output: self.config.output,
            execution_timeout_secs: (self.transport.kind() == TransportKind::Process)
                .then_some(self.config.execution_timeout_secs),
            binary,
            params,
            server,
        }
    }

    /// Upgrades the executable through `binaries` and switches to it.
    ///
    /// Returns the new version. Not available in server mode.
    pub async fn upgrade(&mut self, binaries: &dyn BinaryManager) -> Result<String> {
        if self.transport.kind() != TransportKind::Process {
            return Err(ClientError::config("upgrade is not available in server mode"));
        }

        let binary = binaries
            .upgrade(&self.config.resolved_download_dir())
            .await?;
        let version = binary.version.clone();
        info!("stackql upgraded to version {}", version);

        self.transport = Arc::new(Transport::Process(ProcessTransport::new(
            binary,
            &self.config,
        )));
        Ok(version)
    }

    /// Releases the transport, terminating a server connection.
    pub async fn close(self) -> Result<()> {
        self.transport.close().await
    }
}

/// Read-only view of a session's resolved settings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionProperties {
    pub package_version: &'static str,
    pub transport: TransportKind,
    pub output: OutputFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<BinaryInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

async fn execute_on(
    transport: &Transport,
    query: &Query,
    format: OutputFormat,
) -> Result<QueryResult> {
    match transport.run_query(query).await? {
        RawOutput::Text(text) => parser::parse(&text, format),
        RawOutput::Rows(rows) => Ok(QueryResult::Records(rows)),
    }
}
