//! Process transport: one runtime invocation per call.
//!
//! Every call spawns the executable with a freshly composed argument list,
//! captures its output and reaps it. Nothing is shared between calls, so calls
//! may run concurrently without coordination.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::binary::BinaryInfo;
use crate::config::{Config, HttpConfig, OutputFormat};
use crate::error::{ClientError, Result};
use crate::query::Query;

/// Subcommand used for both queries and statements.
const EXEC_SUBCOMMAND: &str = "exec";

/// Maximum characters of stderr carried by an execution error.
const MAX_STDERR_CHARS: usize = 2048;

/// Captured output of a finished runtime invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Spawn-per-call transport.
#[derive(Debug, Clone)]
pub struct ProcessTransport {
    binary: BinaryInfo,
    params: Vec<String>,
    timeout: Duration,
}

impl ProcessTransport {
    /// Creates a transport for a resolved executable, composing the flags
    /// shared by every call from `config`.
    pub fn new(binary: BinaryInfo, config: &Config) -> Self {
        Self {
            binary,
            params: compose_params(config),
            timeout: Duration::from_secs(config.execution_timeout_secs),
        }
    }

    pub fn binary(&self) -> &BinaryInfo {
        &self.binary
    }

    pub fn bin_path(&self) -> &Path {
        &self.binary.path
    }

    /// Flags appended after the query text on every call.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Builds the full argument list for one call.
    pub fn args_for(&self, query: &Query) -> Vec<String> {
        let mut args = Vec::with_capacity(self.params.len() + 2);
        args.push(EXEC_SUBCOMMAND.to_string());
        args.push(query.text().to_string());
        args.extend(self.params.iter().cloned());
        args
    }

    /// Runs a query or statement and returns its standard output.
    pub async fn run_query(&self, query: &Query) -> Result<String> {
        let output = self.run(&self.args_for(query), self.timeout).await?;
        Ok(output.stdout)
    }

    /// Spawns the executable with `argv` and waits up to `timeout`.
    ///
    /// A non-zero exit fails with `ExecutionFailed` carrying stderr, as does a
    /// clean exit that wrote only to stderr. An expired deadline kills and
    /// reaps the child before failing with `Timeout`.
    pub async fn run(&self, argv: &[String], timeout: Duration) -> Result<ProcessOutput> {
        let output = run_command(&self.binary.path, argv, timeout).await?;

        if output.exit_code != 0 {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim()
            } else {
                output.stderr.trim()
            };
            return Err(ClientError::execution(format!(
                "exit status {}: {}",
                output.exit_code,
                truncate(detail, MAX_STDERR_CHARS)
            )));
        }

        if output.stdout.trim().is_empty() && !output.stderr.trim().is_empty() {
            return Err(ClientError::execution(truncate(
                output.stderr.trim(),
                MAX_STDERR_CHARS,
            )));
        }

        Ok(output)
    }
}

/// Spawns `program` and collects its output, enforcing `timeout`.
///
/// Returns the output regardless of exit status.
pub async fn run_command(
    program: &Path,
    argv: &[String],
    timeout: Duration,
) -> Result<ProcessOutput> {
    let start = Instant::now();

    let mut child = Command::new(program)
        .args(argv)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            ClientError::execution(format!("Failed to spawn {}: {e}", program.display()))
        })?;

    let collected = tokio::time::timeout(timeout, collect_output(&mut child)).await;

    let (status, stdout, stderr) = match collected {
        Ok(result) => result.map_err(|e| {
            ClientError::execution(format!("Failed to read output of {}: {e}", program.display()))
        })?,
        Err(_) => {
            warn!(
                "{} exceeded {:?}, terminating pid {:?}",
                program.display(),
                timeout,
                child.id()
            );
            if let Err(e) = child.kill().await {
                warn!("Failed to terminate timed out process: {}", e);
            }
            return Err(ClientError::Timeout(timeout.as_secs()));
        }
    };

    let exit_code = status.code().unwrap_or(-1);
    debug!(
        "{} exited with {} in {:?}",
        program.display(),
        exit_code,
        start.elapsed()
    );

    let stdout = String::from_utf8(stdout).map_err(|e| {
        ClientError::parse(format!(
            "{} wrote invalid UTF-8 to stdout: {e}",
            program.display()
        ))
    })?;

    Ok(ProcessOutput {
        stdout,
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    })
}

/// Drains both pipes concurrently, then reaps the child.
async fn collect_output(child: &mut Child) -> std::io::Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    let read_stdout = async {
        if let Some(pipe) = stdout_pipe.as_mut() {
            pipe.read_to_end(&mut stdout).await?;
        }
        Ok::<_, std::io::Error>(())
    };
    let read_stderr = async {
        if let Some(pipe) = stderr_pipe.as_mut() {
            pipe.read_to_end(&mut stderr).await?;
        }
        Ok::<_, std::io::Error>(())
    };
    tokio::try_join!(read_stdout, read_stderr)?;

    let status = child.wait().await?;
    Ok((status, stdout, stderr))
}

/// Composes the flags shared by every call, in the order the runtime
/// documents them. Custom parameters come last.
fn compose_params(config: &Config) -> Vec<String> {
    let mut params = vec!["--output".to_string(), config.output.as_str().to_string()];

    if let Some(auth) = &config.auth {
        params.push("--auth".to_string());
        params.push(auth.to_arg());
    }

    if config.output == OutputFormat::Csv {
        if let Some(delimiter) = &config.delimiter {
            params.push("--delimiter".to_string());
            params.push(delimiter.clone());
        }
    }

    if config.hide_headers && !config.output.is_structured() {
        params.push("--hideheaders".to_string());
    }

    let http = config.http.clone().unwrap_or_default();
    push_http_params(&mut params, &http);

    if let Some(proxy) = &config.proxy {
        params.push("--http.proxy.host".to_string());
        params.push(proxy.host.clone());
        params.push("--http.proxy.port".to_string());
        params.push(proxy.port.to_string());
        if let Some(user) = &proxy.user {
            params.push("--http.proxy.user".to_string());
            params.push(user.clone());
        }
        if let Some(password) = &proxy.password {
            params.push("--http.proxy.password".to_string());
            params.push(password.clone());
        }
        params.push("--http.proxy.scheme".to_string());
        params.push(proxy.scheme.to_lowercase());
    }

    params.extend(config.custom_params.iter().cloned());
    params
}

fn push_http_params(params: &mut Vec<String>, http: &HttpConfig) {
    let pairs = [
        ("--http.response.maxResults", http.max_results),
        ("--http.response.pageLimit", http.page_limit),
        ("--indirect.depth.max", http.max_depth),
        ("--apirequesttimeout", http.api_timeout),
    ];
    for (flag, value) in pairs {
        params.push(flag.to_string());
        params.push(value.to_string());
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}
