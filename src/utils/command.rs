use async_process::{Command, Output};
use tracing::debug;

/// Execute a GridEngine command asynchronously and return the output
pub async fn execute_command(cmd: &str, args: &[String]) -> std::io::Result<Output> {
    debug!(command = cmd, ?args, "running command");
    let output = Command::new(cmd).args(args).output().await?;
    debug!(
        command = cmd,
        status = %output.status,
        stdout_bytes = output.stdout.len(),
        "command finished"
    );

    Ok(output)
}

/// Stderr of a finished command, trimmed for display
pub fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}
