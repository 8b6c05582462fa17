//! Runtime executable lifecycle boundary.
//!
//! Acquiring and upgrading the executable belongs to an external installer.
//! The client only needs a resolved path and version, exposed through the
//! `BinaryManager` trait. `InstalledBinary` is the probe-only implementation:
//! it locates an existing executable and reads its version, but never
//! downloads anything.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ClientError, Result};

/// How long `--version` may take before the probe gives up.
const VERSION_PROBE_TIMEOUT_SECS: u64 = 10;

/// A resolved runtime executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryInfo {
    /// Absolute or caller-supplied path to the executable.
    pub path: PathBuf,
    /// Version string, e.g. `v0.5.396`.
    pub version: String,
    /// Short commit sha of the build, when reported.
    pub sha: Option<String>,
}

/// Resolves and upgrades the runtime executable.
#[async_trait]
pub trait BinaryManager: Send + Sync {
    /// Locates the executable under `download_dir` and reports its version.
    async fn resolve(&self, download_dir: &Path) -> Result<BinaryInfo>;

    /// Replaces the executable with the latest release and reports the result.
    async fn upgrade(&self, download_dir: &Path) -> Result<BinaryInfo>;
}

/// Returns the executable's file name on this platform.
pub fn binary_name() -> &'static str {
    if cfg!(windows) {
        "stackql.exe"
    } else {
        "stackql"
    }
}

/// Probe-only manager for an executable installed out of band.
#[derive(Debug, Clone, Default)]
pub struct InstalledBinary {
    path_override: Option<PathBuf>,
}

impl InstalledBinary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an explicit executable path instead of `<download_dir>/stackql`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path_override: Some(path.into()),
        }
    }

    fn locate(&self, download_dir: &Path) -> PathBuf {
        self.path_override
            .clone()
            .unwrap_or_else(|| download_dir.join(binary_name()))
    }
}

#[async_trait]
impl BinaryManager for InstalledBinary {
    async fn resolve(&self, download_dir: &Path) -> Result<BinaryInfo> {
        let path = self.locate(download_dir);
        if !path.is_file() {
            return Err(ClientError::binary(format!(
                "{} not found; install the runtime or set binary_path",
                path.display()
            )));
        }
        probe_version(&path).await
    }

    /// Re-reads the version after an external installer has replaced the file.
    async fn upgrade(&self, download_dir: &Path) -> Result<BinaryInfo> {
        self.resolve(download_dir).await
    }
}

/// Runs `<path> --version` and extracts version and sha.
pub async fn probe_version(path: &Path) -> Result<BinaryInfo> {
    let output = tokio::time::timeout(
        Duration::from_secs(VERSION_PROBE_TIMEOUT_SECS),
        Command::new(path)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| {
        ClientError::binary(format!(
            "{} --version timed out after {VERSION_PROBE_TIMEOUT_SECS} seconds",
            path.display()
        ))
    })?
    .map_err(|e| ClientError::binary(format!("Failed to run {}: {e}", path.display())))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let (version, sha) = parse_version_output(&stdout).ok_or_else(|| {
        ClientError::binary(format!(
            "Unrecognized version output from {}: {}",
            path.display(),
            stdout.trim()
        ))
    })?;

    debug!("Resolved {} at version {}", path.display(), version);

    Ok(BinaryInfo {
        path: path.to_path_buf(),
        version,
        sha,
    })
}

/// Parses output such as `stackql v0.5.396 BuildCommitSHA: 8f1d6f5 ...`.
pub fn parse_version_output(output: &str) -> Option<(String, Option<String>)> {
    static VERSION_RE: OnceLock<Regex> = OnceLock::new();
    static SHA_RE: OnceLock<Regex> = OnceLock::new();

    let version_re = VERSION_RE.get_or_init(|| {
        Regex::new(r"\bv?(\d+\.\d+\.\d+)\b").expect("version pattern is valid")
    });
    let sha_re = SHA_RE.get_or_init(|| {
        Regex::new(r"BuildCommitSHA:\s*([0-9a-fA-F]+)").expect("sha pattern is valid")
    });

    let version = version_re.captures(output)?.get(1)?.as_str();
    let sha = sha_re
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    Some((format!("v{version}"), sha))
}
