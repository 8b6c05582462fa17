//! Connection transport: a single persistent wire-protocol connection.
//!
//! The StackQL server speaks the PostgreSQL protocol. All calls of a session
//! share one `PgConnection`, and the protocol is strictly request/response on
//! one stream, so every round trip runs under a mutex. A transport failure
//! poisons the connection for good; callers rebuild the session instead of
//! reconnecting.

use std::time::{Duration, Instant};

use serde_json::{Map, Number, Value};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column as SqlxColumn, ConnectOptions, Connection, Row as SqlxRow, TypeInfo};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{AuthConfig, ServerConfig};
use crate::error::{ClientError, Result};
use crate::query::{parser, Record};

/// Maximum number of connection attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Startup option carrying the opaque auth blob.
const AUTH_OPTION: &str = "auth";

#[derive(Debug)]
enum ConnectionState {
    Open(PgConnection),
    Closed,
    Lost(String),
}

/// Persistent connection to a StackQL server.
#[derive(Debug)]
pub struct ConnectionTransport {
    server: ServerConfig,
    auth: Option<AuthConfig>,
    state: Mutex<ConnectionState>,
}

impl ConnectionTransport {
    /// Connects to `server`, forwarding `auth` untouched.
    pub async fn connect(server: &ServerConfig, auth: Option<&AuthConfig>) -> Result<Self> {
        let transport = Self {
            server: server.clone(),
            auth: auth.cloned(),
            state: Mutex::new(ConnectionState::Closed),
        };
        transport.open().await?;
        Ok(transport)
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    /// Establishes the connection. A no-op once open; fails with
    /// `ConnectionLost` after the connection has broken.
    pub async fn open(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match &*state {
            ConnectionState::Open(_) => Ok(()),
            ConnectionState::Lost(reason) => Err(ClientError::connection_lost(reason.clone())),
            ConnectionState::Closed => {
                let conn = self.establish().await?;
                *state = ConnectionState::Open(conn);
                Ok(())
            }
        }
    }

    /// Returns true while the connection is usable.
    pub async fn is_open(&self) -> bool {
        matches!(&*self.state.lock().await, ConnectionState::Open(_))
    }

    /// Runs `sql` and decodes every returned row.
    pub async fn query(&self, sql: &str) -> Result<Vec<Record>> {
        let start = Instant::now();
        let mut state = self.state.lock().await;
        let conn = match &mut *state {
            ConnectionState::Open(conn) => conn,
            ConnectionState::Lost(reason) => {
                return Err(ClientError::connection_lost(reason.clone()))
            }
            ConnectionState::Closed => {
                return Err(ClientError::connection_lost("connection is closed"))
            }
        };

        // Simple-query protocol: the server does not support prepared statements.
        let result = sqlx::Executor::fetch_all(&mut *conn, sqlx::raw_sql(sql)).await;

        match result {
            Ok(rows) => {
                debug!(
                    "Server query returned {} rows in {:?}",
                    rows.len(),
                    start.elapsed()
                );
                Ok(rows.iter().map(convert_row).collect())
            }
            Err(e) => {
                let err = classify_error(e);
                if let ClientError::ConnectionLost(reason) = &err {
                    warn!("Connection to {} lost: {}", self.server.display_string(), reason);
                    *state = ConnectionState::Lost(reason.clone());
                }
                Err(err)
            }
        }
    }

    /// Runs a statement and returns the server's response as JSON text.
    ///
    /// Statements usually return no rows, which renders as `[]`.
    pub async fn execute(&self, sql: &str) -> Result<String> {
        let rows = self.query(sql).await?;
        parser::to_json(&rows)
    }

    /// Terminates the connection gracefully.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let ConnectionState::Open(conn) = std::mem::replace(&mut *state, ConnectionState::Closed)
        {
            conn.close()
                .await
                .map_err(|e| ClientError::connection_lost(e.to_string()))?;
        }
        Ok(())
    }

    async fn establish(&self) -> Result<PgConnection> {
        let mut options = PgConnectOptions::new()
            .host(&self.server.host)
            .port(self.server.port)
            .username(&self.server.user)
            .database(&self.server.database)
            .application_name("stackql-client");
        if let Some(auth) = &self.auth {
            options = options.options([(AUTH_OPTION, auth.to_arg())]);
        }

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!(
                "Connecting to {} (attempt {} of {})",
                self.server.display_string(),
                attempt,
                MAX_RETRY_ATTEMPTS
            );

            match options.connect().await {
                Ok(conn) => {
                    debug!("Connected to {}", self.server.display_string());
                    return Ok(conn);
                }
                Err(e) => {
                    let is_transient = is_transient_error(&e);
                    last_error = Some(e);

                    if attempt < MAX_RETRY_ATTEMPTS && is_transient {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    } else {
                        break;
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => map_connection_error(e, &self.server),
            None => ClientError::connection(format!(
                "Cannot connect to {}",
                self.server.display_string()
            )),
        })
    }
}

/// Converts a row into a record keyed by column name.
fn convert_row(row: &PgRow) -> Record {
    let mut record = Map::with_capacity(row.columns().len());
    for (i, col) in row.columns().iter().enumerate() {
        record.insert(
            col.name().to_string(),
            convert_value(row, i, col.type_info().name()),
        );
    }
    record
}

/// Converts a single column value into a JSON scalar.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::from(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::from(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .and_then(|v| Number::from_f64(v as f64))
            .map(Value::Number)
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),

        // Simple-query results arrive as text, so everything else decodes
        // as a string without a type check.
        _ => row
            .try_get_unchecked::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Splits driver errors into server-side failures and transport breakage.
fn classify_error(error: sqlx::Error) -> ClientError {
    match error {
        sqlx::Error::Database(_) => ClientError::execution(format_query_error(&error)),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::WorkerCrashed => ClientError::connection_lost(error.to_string()),
        other => ClientError::execution(other.to_string()),
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
        || error_str.contains("does not exist")
    {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps connection errors to messages naming the target.
fn map_connection_error(error: sqlx::Error, server: &ServerConfig) -> ClientError {
    let target = server.display_string();
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        ClientError::connection(format!(
            "Cannot connect to {target}. Check that the server is running."
        ))
    } else if error_str.contains("authentication failed") {
        ClientError::connection(format!(
            "Authentication failed for user '{}' on {target}.",
            server.user
        ))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        ClientError::connection(format!(
            "Connection to {target} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        ClientError::connection(format!("{target}: {error}"))
    }
}

/// Formats a server error with detail and hint if available.
fn format_query_error(error: &sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}
