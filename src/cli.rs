//! Command-line argument parsing.
//!
//! Flags override whatever the config file provides.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stackql_client::config::{AuthConfig, Config, ServerConfig};
use stackql_client::error::{ClientError, Result};

/// Run StackQL queries locally or against a StackQL server.
#[derive(Parser, Debug)]
#[command(name = "stackql-client")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Send queries to a running StackQL server
    #[arg(long, global = true)]
    pub server: bool,

    /// Server URL (e.g., postgres://localhost:5466); implies --server
    #[arg(long, value_name = "URL", global = true)]
    pub server_url: Option<String>,

    /// Server host
    #[arg(short = 'H', long, value_name = "HOST", global = true)]
    pub host: Option<String>,

    /// Server port
    #[arg(short = 'p', long, value_name = "PORT", global = true)]
    pub port: Option<u16>,

    /// Output format: json, csv, table, or text
    #[arg(short = 'o', long, value_name = "FORMAT", global = true)]
    pub output: Option<String>,

    /// Hide column headers (csv, table and text output)
    #[arg(long, global = true)]
    pub hide_headers: bool,

    /// CSV delimiter
    #[arg(long, value_name = "CHAR", global = true)]
    pub delimiter: Option<String>,

    /// Provider auth as a JSON string
    #[arg(long, value_name = "JSON", global = true)]
    pub auth: Option<String>,

    /// Directory holding the stackql executable
    #[arg(long, value_name = "DIR", global = true)]
    pub download_dir: Option<PathBuf>,

    /// Explicit path to the stackql executable
    #[arg(long, value_name = "PATH", global = true)]
    pub bin_path: Option<PathBuf>,

    /// Extra argument passed to the executable (repeatable)
    #[arg(long = "param", value_name = "ARG", allow_hyphen_values = true, global = true)]
    pub params: Vec<String>,

    /// Per-call timeout in seconds (process mode)
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Maximum batch queries running at once
    #[arg(long, value_name = "N", global = true)]
    pub max_concurrency: Option<usize>,

    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a query and print its result
    Exec {
        /// StackQL query text
        query: String,
    },
    /// Run a statement (e.g. REGISTRY PULL aws) and print the response
    Stmt {
        /// StackQL statement text
        statement: String,
    },
    /// Run several queries concurrently and print the combined records
    Batch {
        /// StackQL queries
        #[arg(required = true)]
        queries: Vec<String>,
    },
    /// Print the resolved session properties
    Properties,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Applies flags on top of a loaded config.
    pub fn apply_overrides(&self, config: &mut Config) -> Result<()> {
        if let Some(url) = &self.server_url {
            config.server = ServerConfig::from_url(url)?;
            config.server_mode = true;
        }
        if self.server {
            config.server_mode = true;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(output) = &self.output {
            config.output = output.parse().map_err(ClientError::config)?;
        }
        if self.hide_headers {
            config.hide_headers = true;
        }
        if let Some(delimiter) = &self.delimiter {
            config.delimiter = Some(delimiter.clone());
        }
        if let Some(auth) = &self.auth {
            config.auth = Some(AuthConfig::Raw(auth.clone()));
        }
        if let Some(dir) = &self.download_dir {
            config.download_dir = Some(dir.clone());
        }
        if let Some(path) = &self.bin_path {
            config.binary_path = Some(path.clone());
        }
        if !self.params.is_empty() {
            config.custom_params.extend(self.params.iter().cloned());
        }
        if let Some(timeout) = self.timeout {
            config.execution_timeout_secs = timeout;
        }
        if let Some(limit) = self.max_concurrency {
            config.max_concurrency = Some(limit);
        }
        Ok(())
    }
}
