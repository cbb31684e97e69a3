//! Bounded-timeout external command runner.
//!
//! On Unix the child gets its own process group so a timeout kills the
//! whole tree, including test binaries spawned by build tools.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

/// Outcome of one external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Run `argv` with a wall-clock bound.
///
/// A timeout is a normal outcome (`timed_out = true`, no exit code); only
/// spawn failures (missing binary, OS errors) surface as `Err`.
pub async fn run_command(
    argv: &[String],
    timeout_secs: u64,
    working_dir: Option<&Path>,
) -> std::io::Result<CommandOutput> {
    let (program, args) = argv.split_first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command")
    })?;

    let mut cmd = Command::new(program);
    cmd.args(args).kill_on_drop(true);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }
    #[cfg(unix)]
    cmd.process_group(0);

    match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            timed_out: false,
        }),
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(CommandOutput {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
        }),
    }
}
