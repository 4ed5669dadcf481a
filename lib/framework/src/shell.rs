use tokio::process::Command;
use tracing::Instrument as _;
use tracing::debug;
use tracing::debug_span;

use crate::exception::CoreRsResult;

/// Runs the command with `sh -c` and returns trimmed stdout.
///
/// stdout may carry secrets (e.g. access tokens), only its length is logged.
pub async fn run(command: &str) -> CoreRsResult<String> {
    let span = debug_span!("shell", command);

    async {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|err| exception!(message = format!("failed to start command, command={command}"), source = err))?;
        debug!(status = output.status.code());
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        debug!(stdout_length = stdout.len());
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(stderr = %stderr);
        if output.status.success() {
            Ok(stdout)
        } else {
            Err(exception!(
                message = format!(
                    "command failed, status={}, stderr={}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                )
            ))
        }
    }
    .instrument(span)
    .await
}
