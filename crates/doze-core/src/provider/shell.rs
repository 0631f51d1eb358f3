//! Shared subprocess runner for CLI-backed provider adapters.
//!
//! Both [`super::Ec2Provider`] and [`super::GceProvider`] drive the vendor
//! CLI (`aws`, `gcloud`) rather than embed an SDK. Retrying a few times with
//! a short backoff absorbs the vendor CLI's own transient API hiccups
//! without pushing that responsibility onto the reconciliation tick, which
//! already retries on its own 60s cadence.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::error::{ProviderError, ProviderResult};

const CMD_TIMEOUT: Duration = Duration::from_secs(60);
const CMD_RETRIES: usize = 3;
const CMD_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Runs `program args...` with `env` vars set, retrying on non-zero exit.
/// Returns stdout on success.
pub async fn run_with_retries(
    program: &Path,
    args: &[String],
    env: &[(&str, &str)],
    label: &str,
) -> ProviderResult<Vec<u8>> {
    let mut attempt = 0usize;
    loop {
        attempt += 1;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env.iter().copied())
            .kill_on_drop(true)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| ProviderError::Command(format!("failed to spawn {label}: {e}")))?;

        let output = match tokio::time::timeout(CMD_TIMEOUT, child.wait_with_output()).await {
            Ok(res) => res.map_err(|e| ProviderError::Command(format!("{label} failed: {e}")))?,
            Err(_) => return Err(ProviderError::Timeout(CMD_TIMEOUT)),
        };

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let err = ProviderError::Command(format!("{label} failed: {stderr}"));

        if attempt >= CMD_RETRIES {
            return Err(err);
        }

        tokio::time::sleep(CMD_RETRY_BACKOFF).await;
    }
}
