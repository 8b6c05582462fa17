//! Transport layer.
//!
//! Exactly one transport is active per session, chosen once from the
//! configuration: spawn-per-call (`ProcessTransport`) or a persistent server
//! connection (`ConnectionTransport`). The choice never changes afterwards and
//! there is no fallback between the two.

mod connection;
mod process;

pub use connection::ConnectionTransport;
pub use process::{run_command, ProcessOutput, ProcessTransport};

use serde::Serialize;
use tracing::info;

use crate::binary::BinaryManager;
use crate::config::Config;
use crate::error::Result;
use crate::query::{Query, RawOutput};

/// Which transport a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Process,
    Connection,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Connection => "connection",
        }
    }
}

/// The active transport of a session.
#[derive(Debug)]
pub enum Transport {
    Process(ProcessTransport),
    Connection(ConnectionTransport),
}

/// Chooses and builds the transport for `config`.
///
/// Server mode connects eagerly, so an unreachable server fails here with a
/// connection error. Otherwise the executable is resolved through `binaries`.
pub async fn select(config: &Config, binaries: &dyn BinaryManager) -> Result<Transport> {
    if config.server_mode {
        info!("Using server at {}", config.server.display_string());
        let transport = ConnectionTransport::connect(&config.server, config.auth.as_ref()).await?;
        Ok(Transport::Connection(transport))
    } else {
        let binary = binaries.resolve(&config.resolved_download_dir()).await?;
        info!("Using {} ({})", binary.path.display(), binary.version);
        Ok(Transport::Process(ProcessTransport::new(binary, config)))
    }
}

impl Transport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Process(_) => TransportKind::Process,
            Self::Connection(_) => TransportKind::Connection,
        }
    }

    /// Runs a statement and returns the response text verbatim.
    pub async fn run_statement(&self, query: &Query) -> Result<String> {
        match self {
            Self::Process(process) => process.run_query(query).await,
            Self::Connection(connection) => connection.execute(query.text()).await,
        }
    }

    /// Runs a query and returns its unparsed output.
    pub async fn run_query(&self, query: &Query) -> Result<RawOutput> {
        match self {
            Self::Process(process) => process.run_query(query).await.map(RawOutput::Text),
            Self::Connection(connection) => {
                connection.query(query.text()).await.map(RawOutput::Rows)
            }
        }
    }

    /// Releases the transport. Process transports hold nothing to release.
    pub async fn close(&self) -> Result<()> {
        match self {
            Self::Process(_) => Ok(()),
            Self::Connection(connection) => connection.close().await,
        }
    }
}
