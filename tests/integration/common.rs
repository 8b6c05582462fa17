//! Common test utilities: a fake `stackql` executable.
//!
//! The script understands `--version` and dispatches on keywords in the query
//! text (the second argument, after `exec`):
//!
//! - `REGISTRY PULL aws`: prints an install message
//! - `FAIL`: writes to stderr and exits 3
//! - `STDERR_ONLY`: writes a diagnostic to stderr and exits 0
//! - `BAD_BYTES`: prints bytes that are not valid UTF-8
//! - `GARBAGE`: prints non-JSON text
//! - `EMPTY`: prints `[]`
//! - `ARGS`: prints every flag after the query, one per line
//! - `SLEEP <pidfile>`: writes its pid to `<pidfile>` and sleeps 30s
//! - `NAP`: sleeps 1s, then prints one record
//! - `region = '<r>'`: two records for region `<r>` (csv text for `--output csv`)

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use stackql_client::config::Config;

const FAKE_RUNTIME: &str = r##"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "stackql v0.5.396 BuildCommitSHA: 8f1d6f5 BuildDate: 2024-01-01T00:00:00Z"
  exit 0
fi
query="$2"
shift 2
format="$2"
case "$query" in
  SLEEP*)
    echo $$ > "${query#SLEEP }"
    exec sleep 30
    ;;
  "REGISTRY PULL aws")
    echo "aws provider, version 'v24.01.00' successfully installed"
    ;;
  *FAIL*)
    echo "provider error: access denied" >&2
    exit 3
    ;;
  *STDERR_ONLY*)
    echo "error: provider aws not installed" >&2
    ;;
  *BAD_BYTES*)
    printf '\377\376\n'
    ;;
  *GARBAGE*)
    echo "this is not json"
    ;;
  *EMPTY*)
    echo "[]"
    ;;
  *ARGS*)
    printf '%s\n' "$@"
    ;;
  *NAP*)
    sleep 1
    echo '[{"nap":1}]'
    ;;
  *region*)
    region=$(echo "$query" | sed -n "s/.*region = '\([^']*\)'.*/\1/p")
    if [ "$format" = "csv" ]; then
      printf 'region,instanceType,num_instances\n%s,t2.micro,2\n%s,m5.large,1\n' "$region" "$region"
    else
      printf '[{"region":"%s","instanceType":"t2.micro","num_instances":2},{"region":"%s","instanceType":"m5.large","num_instances":1}]\n' "$region" "$region"
    fi
    ;;
  *)
    echo '[{"result":"ok"}]'
    ;;
esac
"##;

/// ETXTBSY: another thread forked while the script was still open for writing.
const TEXT_FILE_BUSY: i32 = 26;

/// Writes the fake runtime into `dir` and returns its path.
pub fn install_fake_runtime(dir: &Path) -> PathBuf {
    let path = dir.join("stackql");
    std::fs::write(&path, FAKE_RUNTIME).expect("write fake runtime");
    let mut perms = std::fs::metadata(&path).expect("stat").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod fake runtime");
    wait_until_executable(&path);
    path
}

/// Retries until no forked child still holds a write handle to the script.
fn wait_until_executable(path: &Path) {
    for _ in 0..100 {
        match std::process::Command::new(path).arg("--version").output() {
            Err(e) if e.raw_os_error() == Some(TEXT_FILE_BUSY) => {
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) => panic!("fake runtime is not executable: {e}"),
            Ok(_) => return,
        }
    }
    panic!("fake runtime stayed busy");
}

/// Process-mode config pointing at the fake runtime.
pub fn fake_config(bin: &Path) -> Config {
    Config {
        binary_path: Some(bin.to_path_buf()),
        ..Default::default()
    }
}

/// Region-filtered query understood by the fake runtime.
pub fn region_query(region: &str) -> String {
    format!(
        "SELECT '{region}' as region, instanceType, COUNT(*) as num_instances \
         FROM aws.ec2.instances WHERE region = '{region}' GROUP BY instanceType"
    )
}
