//! `run_command`: run a program or shell command inside the project.

use super::{non_empty, ToolOutput};
use crate::sandbox::Sandbox;
use anyhow::Context;
use serde::Deserialize;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// Combined output beyond this is cut off.
const MAX_OUTPUT_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunCommandArgs {
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub cwd: Option<String>,
}

impl RunCommandArgs {
    /// The command line as shown to the operator.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.command.clone().unwrap_or_default()];
        if let Some(args) = &self.args {
            parts.extend(args.iter().cloned());
        }
        parts.join(" ")
    }

    fn program_args(&self) -> Option<&[String]> {
        self.args.as_deref().filter(|a| !a.is_empty())
    }
}

pub async fn run_command(sandbox: &Sandbox, args: &RunCommandArgs, timeout: Duration) -> ToolOutput {
    try_run_command(sandbox, args, timeout)
        .await
        .unwrap_or_else(ToolOutput::from_error)
}

async fn try_run_command(
    sandbox: &Sandbox,
    args: &RunCommandArgs,
    timeout: Duration,
) -> anyhow::Result<ToolOutput> {
    let Some(command) = non_empty(&args.command) else {
        return Ok(ToolOutput::error("command is required"));
    };
    let cwd = non_empty(&args.cwd).unwrap_or(".");
    let dir = sandbox.resolve(cwd)?;
    if !dir.as_path().is_dir() {
        return Ok(ToolOutput::error(format!("Directory not found: {}", cwd)));
    }

    // An argument list runs the program directly, without shell interpretation
    let mut cmd = match args.program_args() {
        Some(program_args) => {
            let mut cmd = Command::new(command);
            cmd.args(program_args);
            cmd
        }
        None => shell(command),
    };
    cmd.current_dir(dir.as_path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so a timeout also reaches anything the command spawned
    #[cfg(unix)]
    cmd.process_group(0);

    let start = Instant::now();
    let child = cmd
        .spawn()
        .with_context(|| format!("Failed to start {}", command))?;
    let pid = child.id();
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.with_context(|| format!("Failed to read output of {}", command))?,
        Err(_) => {
            kill_process_group(pid);
            debug!("Command timed out: {}", args.display_command());
            return Ok(ToolOutput::error(format!(
                "Command timed out after {} s",
                timeout.as_secs()
            )));
        }
    };
    debug!(
        "Command finished in {:?} with {}",
        start.elapsed(),
        output.status
    );

    let combined = combine_output(&output.stdout, &output.stderr);
    if output.status.success() {
        return Ok(ToolOutput::Text(combined));
    }

    let code = match output.status.code() {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    };
    let mut reason = format!("Command failed (exit code {})", code);
    if !combined.is_empty() {
        reason.push('\n');
        reason.push_str(&combined);
    }
    Ok(ToolOutput::Error(reason))
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(not(windows))]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: killpg takes no pointers; pgid is the group created for this child.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        debug!(
            "Failed to kill process group {}: {}",
            pgid,
            std::io::Error::last_os_error()
        );
    }
}

/// Dropping the child kills it; there is no group to signal.
#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Non-empty stdout and stderr joined by a newline.
fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let parts: Vec<String> = [stdout, stderr]
        .iter()
        .filter(|bytes| !bytes.is_empty())
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .collect();
    let mut combined = parts.join("\n");
    if combined.len() > MAX_OUTPUT_BYTES {
        let mut cut = MAX_OUTPUT_BYTES;
        while !combined.is_char_boundary(cut) {
            cut -= 1;
        }
        combined.truncate(cut);
        combined.push_str("\n... (output truncated)");
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn setup() -> (TempDir, Sandbox) {
        let dir = tempdir().unwrap();
        let sandbox = Sandbox::new(dir.path());
        (dir, sandbox)
    }

    fn shell_args(command: &str) -> RunCommandArgs {
        RunCommandArgs {
            command: Some(command.to_string()),
            ..Default::default()
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[test]
    fn test_display_command() {
        let args = RunCommandArgs {
            command: Some("git".to_string()),
            args: Some(vec!["status".to_string(), "-s".to_string()]),
            cwd: None,
        };
        assert_eq!(args.display_command(), "git status -s");
        assert_eq!(shell_args("ls -la | wc -l").display_command(), "ls -la | wc -l");
    }

    #[test]
    fn test_combine_output() {
        assert_eq!(combine_output(b"out", b""), "out");
        assert_eq!(combine_output(b"", b"err"), "err");
        assert_eq!(combine_output(b"out", b"err"), "out\nerr");
        assert_eq!(combine_output(b"", b""), "");
    }

    #[tokio::test]
    async fn test_requires_command() {
        let (_dir, sandbox) = setup();
        assert_eq!(
            run_command(&sandbox, &RunCommandArgs::default(), TIMEOUT).await,
            ToolOutput::error("command is required")
        );
    }

    #[tokio::test]
    async fn test_cwd_outside_sandbox() {
        let (_dir, sandbox) = setup();
        let mut args = shell_args("echo hi");
        args.cwd = Some("../".to_string());
        assert_eq!(
            run_command(&sandbox, &args, TIMEOUT).await,
            ToolOutput::error("Path outside project: ../")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_command_runs_in_project() {
        let (dir, sandbox) = setup();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/marker.txt"), "").unwrap();

        let mut args = shell_args("ls && echo done >&2");
        args.cwd = Some("sub".to_string());
        assert_eq!(
            run_command(&sandbox, &args, TIMEOUT).await,
            ToolOutput::Text("marker.txt\n\ndone\n".to_string())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_argument_list_skips_shell() {
        let (_dir, sandbox) = setup();
        let args = RunCommandArgs {
            command: Some("echo".to_string()),
            args: Some(vec!["$HOME".to_string(), "a;b".to_string()]),
            cwd: None,
        };
        assert_eq!(
            run_command(&sandbox, &args, TIMEOUT).await,
            ToolOutput::Text("$HOME a;b\n".to_string())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_reports_exit_code_and_output() {
        let (_dir, sandbox) = setup();
        let output = run_command(&sandbox, &shell_args("echo broken >&2; exit 3"), TIMEOUT).await;
        assert_eq!(
            output,
            ToolOutput::Error("Command failed (exit code 3)\nbroken\n".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error_value() {
        let (_dir, sandbox) = setup();
        let args = RunCommandArgs {
            command: Some("definitely-not-a-real-program-xyz".to_string()),
            args: Some(vec!["--version".to_string()]),
            cwd: None,
        };
        match run_command(&sandbox, &args, TIMEOUT).await {
            ToolOutput::Error(reason) => {
                assert!(reason.starts_with("Failed to start definitely-not-a-real-program-xyz"))
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_command() {
        let (_dir, sandbox) = setup();
        let output = run_command(&sandbox, &shell_args("sleep 5"), Duration::from_millis(200)).await;
        assert_eq!(output, ToolOutput::error("Command timed out after 0 s"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_background_children() {
        let (dir, sandbox) = setup();
        let output = run_command(
            &sandbox,
            &shell_args("(sleep 1; touch late.txt) & wait"),
            Duration::from_millis(200),
        )
        .await;
        assert_eq!(output, ToolOutput::error("Command timed out after 0 s"));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("late.txt").exists());
    }
}
