//! Runs an action's command and pipes its output into a sink.
//!
//! stdout and stderr are merged chunk by chunk in whatever order the child
//! flushes them. A non-zero exit is reported through [`RunStatus`], never as
//! an error; only a failure to start the process is.

use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};

use futures::StreamExt as _;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::{Action, ActionKind};
use crate::error::{PanelError, Result};

/// Interpreter for inline commands.
pub const SHELL: &str = "sh";
/// Interpreter for script actions.
pub const SCRIPT_INTERPRETER: &str = "bash";

/// How long to keep forwarding buffered output once the process has exited.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The process ran to completion. `code` is `None` when it was killed by
    /// a signal it did not get from us.
    Exited { code: Option<i32> },
    /// The run was cancelled and the process killed.
    Cancelled,
}

impl RunStatus {
    pub fn success(&self) -> bool {
        matches!(self, RunStatus::Exited { code: Some(0) })
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Exited { code: Some(code) } => write!(f, "exit status {code}"),
            RunStatus::Exited { code: None } => f.write_str("terminated by signal"),
            RunStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Command construction
// ---------------------------------------------------------------------------

/// Build the process for `action` with piped output and no stdin.
pub fn command_for(action: &Action) -> Command {
    let mut cmd = match &action.kind {
        ActionKind::Inline { command } => {
            let mut cmd = Command::new(SHELL);
            cmd.arg("-c").arg(command);
            cmd
        }
        ActionKind::Script {
            working_dir,
            script,
        } => {
            let mut cmd = Command::new(SCRIPT_INTERPRETER);
            cmd.arg(script).current_dir(working_dir);
            cmd
        }
    };
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so cancellation reaches everything the action forks.
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

fn describe(action: &Action) -> String {
    match &action.kind {
        ActionKind::Inline { .. } => SHELL.to_string(),
        ActionKind::Script {
            working_dir,
            script,
        } => format!("{SCRIPT_INTERPRETER} {script} (in {})", working_dir.display()),
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Run `action` to completion, writing its output to `sink`.
pub async fn execute<W>(action: &Action, sink: &mut W) -> Result<RunStatus>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    run(action, sink, None).await
}

/// Like [`execute`], but kills the process as soon as `cancel` fires.
pub async fn execute_cancelable<W>(
    action: &Action,
    sink: &mut W,
    cancel: &CancellationToken,
) -> Result<RunStatus>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    run(action, sink, Some(cancel)).await
}

async fn run<W>(action: &Action, sink: &mut W, cancel: Option<&CancellationToken>) -> Result<RunStatus>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let start = Instant::now();
    let identity = action.identity();

    let mut child = match command_for(action).spawn() {
        Ok(child) => child,
        Err(source) => {
            let program = describe(action);
            warn!(action = %identity, program = %program, error = %source, "failed to launch action");
            let _ = sink
                .write_all(format!("failed to launch '{program}': {source}\n").as_bytes())
                .await;
            let _ = sink.flush().await;
            return Err(PanelError::Launch { program, source });
        }
    };
    info!(action = %identity, pid = child.id(), "action started");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| PanelError::Io(std::io::Error::other("stdout not captured")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| PanelError::Io(std::io::Error::other("stderr not captured")))?;
    let mut output = futures::stream::select(ReaderStream::new(stdout), ReaderStream::new(stderr));

    let mut sink_open = true;
    let mut output_open = true;
    // The process exiting ends the run, even if a background descendant still
    // holds the pipes open.
    let waited = loop {
        tokio::select! {
            biased;
            _ = cancelled(cancel) => return Ok(terminate(&mut child, identity).await),
            status = child.wait() => break status,
            chunk = output.next(), if output_open => match chunk {
                Some(chunk) => forward(chunk, sink, &mut sink_open, identity).await,
                None => output_open = false,
            },
        }
    };

    if output_open {
        let deadline = tokio::time::Instant::now() + OUTPUT_DRAIN_GRACE;
        while let Ok(Some(chunk)) = tokio::time::timeout_at(deadline, output.next()).await {
            forward(chunk, sink, &mut sink_open, identity).await;
        }
    }
    drop(output);
    if sink_open {
        let _ = sink.flush().await;
    }

    let status = RunStatus::Exited {
        code: waited?.code(),
    };
    info!(
        action = %identity,
        status = %status,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "action finished"
    );
    Ok(status)
}

async fn cancelled(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn forward<W>(
    chunk: std::io::Result<impl AsRef<[u8]>>,
    sink: &mut W,
    sink_open: &mut bool,
    identity: &str,
) where
    W: AsyncWrite + Unpin + ?Sized,
{
    match chunk {
        Ok(bytes) if *sink_open => {
            if let Err(e) = sink.write_all(bytes.as_ref()).await {
                // Keep draining so the child never blocks on a full pipe.
                debug!(action = %identity, error = %e, "output sink closed");
                *sink_open = false;
            }
        }
        Ok(_) => {}
        Err(e) => warn!(action = %identity, error = %e, "failed to read action output"),
    }
}

/// Kill the run's whole process group, then reap the child.
async fn terminate(child: &mut Child, identity: &str) -> RunStatus {
    if let Err(e) = kill_process_group(child) {
        debug!(action = %identity, error = %e, "process group kill failed");
    }
    match child.try_wait() {
        Ok(Some(_)) => {}
        _ => {
            if let Err(e) = child.kill().await {
                debug!(action = %identity, error = %e, "kill failed");
            }
        }
    }
    info!(action = %identity, "action cancelled");
    RunStatus::Cancelled
}

#[cfg(unix)]
fn kill_process_group(child: &Child) -> std::io::Result<()> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => killpg(Pid::from_raw(pid as i32), Signal::SIGKILL).map_err(std::io::Error::from),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) -> std::io::Result<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn inline(command: &str) -> Action {
        Action::new(
            "test",
            "inline",
            ActionKind::Inline {
                command: command.into(),
            },
        )
    }

    fn script(dir: &std::path::Path, name: &str) -> Action {
        Action::new(
            "test",
            "script",
            ActionKind::Script {
                working_dir: dir.to_path_buf(),
                script: name.into(),
            },
        )
    }

    #[tokio::test]
    async fn inline_command_output_is_captured() {
        let mut out = Vec::new();
        let status = execute(&inline("echo hello"), &mut out).await.unwrap();
        assert_eq!(status, RunStatus::Exited { code: Some(0) });
        assert!(status.success());
        assert_eq!(String::from_utf8(out).unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn stderr_is_merged_into_sink() {
        let mut out = Vec::new();
        execute(&inline("echo out; echo err-output >&2"), &mut out)
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("out\n"), "got {text:?}");
        assert!(text.contains("err-output\n"), "got {text:?}");
    }

    #[tokio::test]
    async fn non_zero_exit_is_not_an_error() {
        let mut out = Vec::new();
        let status = execute(&inline("echo failing; exit 3"), &mut out)
            .await
            .unwrap();
        assert_eq!(status, RunStatus::Exited { code: Some(3) });
        assert!(!status.success());
        assert_eq!(status.to_string(), "exit status 3");
        assert_eq!(String::from_utf8(out).unwrap(), "failing\n");
    }

    #[tokio::test]
    async fn script_runs_inside_working_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("deploy.sh"), "echo deploying\npwd -P\n").unwrap();

        let mut out = Vec::new();
        let status = execute(&script(dir.path(), "deploy.sh"), &mut out)
            .await
            .unwrap();
        assert!(status.success());

        let text = String::from_utf8(out).unwrap();
        let expected = std::fs::canonicalize(dir.path()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("deploying"));
        assert_eq!(lines.next(), Some(expected.to_str().unwrap()));
    }

    #[tokio::test]
    async fn missing_working_dir_is_a_launch_error() {
        let dir = TempDir::new().unwrap();
        let action = script(&dir.path().join("does-not-exist"), "deploy.sh");

        let mut out = Vec::new();
        let err = execute(&action, &mut out).await.unwrap_err();
        assert!(matches!(err, PanelError::Launch { .. }), "got {err:?}");
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("failed to launch"), "got {text:?}");
    }

    #[tokio::test]
    async fn missing_script_surfaces_as_exit_status() {
        let dir = TempDir::new().unwrap();
        let mut out = Vec::new();
        let status = execute(&script(dir.path(), "nope.sh"), &mut out)
            .await
            .unwrap();
        assert!(!status.success());
        assert!(!out.is_empty(), "bash should explain the missing script");
    }

    #[tokio::test]
    async fn cancel_kills_running_process() {
        let token = CancellationToken::new();
        let action = inline("echo started; sleep 30");
        let run_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut out = Vec::new();
            let status = execute_cancelable(&action, &mut out, &run_token).await;
            (status, out)
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();

        let (status, _out) = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("cancelled run should return promptly")
            .unwrap();
        assert_eq!(status.unwrap(), RunStatus::Cancelled);
    }

    /// Pids of live (non-zombie) processes whose command line contains `needle`.
    #[cfg(target_os = "linux")]
    fn live_processes_matching(needle: &str) -> Vec<u32> {
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok()?.file_name().to_str()?.parse::<u32>().ok())
            .filter(|pid| {
                let cmdline = std::fs::read(format!("/proc/{pid}/cmdline")).unwrap_or_default();
                let cmdline = String::from_utf8_lossy(&cmdline).replace('\0', " ");
                let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).unwrap_or_default();
                let zombie = stat
                    .rsplit_once(')')
                    .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z'));
                cmdline.contains(needle) && !zombie
            })
            .collect()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn cancel_kills_commands_forked_by_script() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("long.sh"), "echo begin\nsleep 41.713\necho end\n").unwrap();
        let action = script(dir.path(), "long.sh");
        let token = CancellationToken::new();
        let run_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut out = Vec::new();
            execute_cancelable(&action, &mut out, &run_token).await
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while live_processes_matching("sleep 41.713").is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("script should start its sleep");

        token.cancel();
        let status = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("cancelled run should return promptly")
            .unwrap()
            .unwrap();
        assert_eq!(status, RunStatus::Cancelled);

        tokio::time::timeout(Duration::from_secs(2), async {
            while !live_processes_matching("sleep 41.713").is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("no command forked by the script may outlive cancellation");
    }

    #[tokio::test]
    async fn background_descendant_does_not_hold_run_open() {
        let mut out = Vec::new();
        let started = std::time::Instant::now();
        let status = tokio::time::timeout(
            Duration::from_secs(3),
            execute(&inline("(sleep 4) & echo hi"), &mut out),
        )
        .await
        .expect("run should end when the shell exits")
        .unwrap();
        assert!(status.success());
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(String::from_utf8(out).unwrap(), "hi\n");
    }

    #[tokio::test]
    async fn already_cancelled_token_stops_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        let mut out = Vec::new();
        let status = tokio::time::timeout(
            Duration::from_secs(5),
            execute_cancelable(&inline("sleep 30"), &mut out, &token),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(status, RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancelling_after_completion_is_a_no_op() {
        let token = CancellationToken::new();
        let mut out = Vec::new();
        let status = execute_cancelable(&inline("echo done"), &mut out, &token)
            .await
            .unwrap();
        token.cancel();
        assert!(status.success());
        assert_eq!(String::from_utf8(out).unwrap(), "done\n");
    }

    #[tokio::test]
    async fn closed_sink_still_waits_for_exit() {
        let (mut writer, reader) = tokio::io::duplex(16);
        drop(reader);
        let status = execute(&inline("seq 1 1000; exit 4"), &mut writer)
            .await
            .unwrap();
        assert_eq!(status, RunStatus::Exited { code: Some(4) });
    }

    #[tokio::test]
    async fn large_output_is_forwarded_intact() {
        let mut out = Vec::new();
        execute(&inline("seq 1 5000"), &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 5000);
        assert_eq!(text.lines().last(), Some("5000"));
    }
}
