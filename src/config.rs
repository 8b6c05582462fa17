//! Configuration management for the StackQL client.
//!
//! Handles loading configuration from TOML files. A `Config` is resolved once,
//! validated, and treated as immutable by the session built from it.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Default port a StackQL server listens on.
pub const DEFAULT_SERVER_PORT: u16 = 5466;

/// Default per-call execution timeout for process mode.
pub const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 300;

/// Output format requested from the runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Array of records; the only structurally parsed format.
    #[default]
    Json,
    /// Delimited text.
    Csv,
    /// Boxed table text.
    Table,
    /// Plain text.
    Text,
}

impl OutputFormat {
    /// Returns the flag value the runtime expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Table => "table",
            Self::Text => "text",
        }
    }

    /// Returns true if output in this format decodes into records.
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Json)
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "table" => Ok(Self::Table),
            "text" => Ok(Self::Text),
            _ => Err(format!(
                "Invalid output format: {s}. Expected: json, csv, table, or text"
            )),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Send queries to a running server instead of spawning the runtime.
    #[serde(default)]
    pub server_mode: bool,

    /// Server connection target (server mode only).
    #[serde(default)]
    pub server: ServerConfig,

    /// Output format requested from the runtime.
    #[serde(default)]
    pub output: OutputFormat,

    /// Suppress column headers in presentation formats.
    #[serde(default)]
    pub hide_headers: bool,

    /// CSV delimiter (process mode, csv output only).
    pub delimiter: Option<String>,

    /// Provider authentication, forwarded verbatim.
    pub auth: Option<AuthConfig>,

    /// Extra arguments appended to every runtime invocation.
    #[serde(default)]
    pub custom_params: Vec<String>,

    /// Directory holding the runtime executable.
    pub download_dir: Option<PathBuf>,

    /// Explicit path to the runtime executable, bypassing `download_dir`.
    pub binary_path: Option<PathBuf>,

    /// Per-call deadline for process mode.
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_secs: u64,

    /// Upper bound on concurrently running batch members (unbounded if unset).
    pub max_concurrency: Option<usize>,

    /// Provider HTTP behaviour (process mode).
    pub http: Option<HttpConfig>,

    /// HTTP proxy settings (process mode).
    pub proxy: Option<ProxyConfig>,
}

fn default_execution_timeout() -> u64 {
    DEFAULT_EXECUTION_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_mode: false,
            server: ServerConfig::default(),
            output: OutputFormat::default(),
            hide_headers: false,
            delimiter: None,
            auth: None,
            custom_params: Vec::new(),
            download_dir: None,
            binary_path: None,
            execution_timeout_secs: default_execution_timeout(),
            max_concurrency: None,
            http: None,
            proxy: None,
        }
    }
}

/// Server connection target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// User presented at startup.
    #[serde(default = "default_identity")]
    pub user: String,

    /// Database presented at startup.
    #[serde(default = "default_identity")]
    pub database: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_identity() -> String {
    "stackql".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_identity(),
            database: default_identity(),
        }
    }
}

impl ServerConfig {
    /// Creates a server target from a URL.
    ///
    /// Format: `postgres://[user@]host[:port][/database]`
    pub fn from_url(url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| ClientError::config(format!("Invalid server URL: {e}")))?;

        if url.scheme() != "postgres" && url.scheme() != "postgresql" {
            return Err(ClientError::config(format!(
                "Invalid scheme '{}'. Expected 'postgres' or 'postgresql'",
                url.scheme()
            )));
        }

        let mut server = Self::default();
        if let Some(host) = url.host_str() {
            server.host = host.to_string();
        }
        if let Some(port) = url.port() {
            server.port = port;
        }
        if !url.username().is_empty() {
            server.user = url.username().to_string();
        }
        if let Some(database) = url.path().strip_prefix('/').filter(|db| !db.is_empty()) {
            server.database = database.to_string();
        }

        Ok(server)
    }

    /// Returns `host:port` for logging and display.
    pub fn display_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Opaque provider authentication blob.
///
/// Either an inline object (`{ aws = { type = "aws_signing_v4", ... } }`) or a
/// pre-serialized JSON string. The client never inspects its contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthConfig {
    Raw(String),
    Structured(serde_json::Value),
}

impl AuthConfig {
    /// Returns the blob as the single-line JSON text the runtime accepts.
    pub fn to_arg(&self) -> String {
        match self {
            Self::Raw(s) => s.clone(),
            Self::Structured(v) => v.to_string(),
        }
    }
}

/// Provider HTTP behaviour passed to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Provider API request timeout in seconds.
    #[serde(default = "default_api_timeout")]
    pub api_timeout: i64,

    /// Max results per HTTP request (-1 for the provider default).
    #[serde(default = "default_max_results")]
    pub max_results: i64,

    /// Max pages returned per resource.
    #[serde(default = "default_page_limit")]
    pub page_limit: i64,

    /// Max depth for indirect queries (views and subqueries).
    #[serde(default = "default_max_depth")]
    pub max_depth: i64,
}

fn default_api_timeout() -> i64 {
    45
}

fn default_max_results() -> i64 {
    -1
}

fn default_page_limit() -> i64 {
    20
}

fn default_max_depth() -> i64 {
    5
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_timeout: default_api_timeout(),
            max_results: default_max_results(),
            page_limit: default_page_limit(),
            max_depth: default_max_depth(),
        }
    }
}

/// HTTP proxy settings passed to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub host: String,

    #[serde(default = "default_proxy_port")]
    pub port: i32,

    pub user: Option<String>,

    pub password: Option<String>,

    #[serde(default = "default_proxy_scheme")]
    pub scheme: String,
}

fn default_proxy_port() -> i32 {
    -1
}

fn default_proxy_scheme() -> String {
    "http".to_string()
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stackql-client")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ClientError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            ClientError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Returns the directory the runtime executable lives in.
    pub fn resolved_download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(default_download_dir)
    }

    /// Checks the option set for contradictions.
    pub fn validate(&self) -> Result<()> {
        if self.execution_timeout_secs == 0 {
            return Err(ClientError::config(
                "execution_timeout_secs must be greater than zero",
            ));
        }

        if self.max_concurrency == Some(0) {
            return Err(ClientError::config(
                "max_concurrency must be greater than zero",
            ));
        }

        if self.server_mode {
            let process_only = [
                ("download_dir", self.download_dir.is_some()),
                ("binary_path", self.binary_path.is_some()),
                ("custom_params", !self.custom_params.is_empty()),
                ("delimiter", self.delimiter.is_some()),
                ("http", self.http.is_some()),
                ("proxy", self.proxy.is_some()),
            ];
            if let Some((name, _)) = process_only.iter().find(|(_, set)| *set) {
                return Err(ClientError::config(format!(
                    "{name} is not allowed in server mode"
                )));
            }

            if !self.output.is_structured() {
                return Err(ClientError::config(format!(
                    "{} output is not supported in server mode, use json instead",
                    self.output
                )));
            }
        }

        if let Some(delimiter) = &self.delimiter {
            if self.output != OutputFormat::Csv {
                return Err(ClientError::config("delimiter requires csv output"));
            }
            if delimiter.chars().count() != 1 {
                return Err(ClientError::config(format!(
                    "delimiter must be a single character, got '{delimiter}'"
                )));
            }
        }

        if let Some(proxy) = &self.proxy {
            let scheme = proxy.scheme.to_lowercase();
            if scheme != "http" && scheme != "https" {
                return Err(ClientError::config(format!(
                    "Invalid proxy scheme '{}'. Expected 'http' or 'https'",
                    proxy.scheme
                )));
            }
        }

        Ok(())
    }
}

/// Returns the platform default location for the runtime executable.
pub fn default_download_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("stackql")
}
