//! Blocking execution of collaborator processes with a bounded timeout.

use crate::errors::{Error, Result};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Exit code, if the process was not killed by a signal.
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Render a command the way a user would type it.
pub fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|s| s.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `cmd` to completion, killing it once `timeout` elapses.
///
/// Output streams are drained on helper threads so a chatty child cannot
/// block on a full pipe while we wait for it.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<CommandOutput> {
    let command = describe(&cmd);
    log::debug!("Running `{}` (timeout {}s)", command, timeout.as_secs());

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::ProcessFailure {
            command: command.clone(),
            status: "failed to start".to_string(),
            stderr: e.to_string(),
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_until(&mut child, Instant::now() + timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            log::warn!("`{}` exceeded {}s and was killed", command, timeout.as_secs());
            return Err(Error::ProcessTimeout { command, timeout });
        }
        Err(e) => {
            let _ = child.kill();
            return Err(Error::ProcessFailure {
                command,
                status: "wait failed".to_string(),
                stderr: e.to_string(),
            });
        }
    };

    Ok(CommandOutput {
        status,
        stdout: join(stdout),
        stderr: join(stderr),
    })
}

fn wait_until(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> Option<JoinHandle<String>> {
    stream.map(|mut stream| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Run `cmd` and treat any non-success exit status as a failure.
pub fn run_checked(cmd: Command, timeout: Duration) -> Result<CommandOutput> {
    let command = describe(&cmd);
    let output = run_with_timeout(cmd, timeout)?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(failure(command, &output))
    }
}

/// Build a [`Error::ProcessFailure`] from a finished process.
pub fn failure(command: String, output: &CommandOutput) -> Error {
    Error::ProcessFailure {
        command,
        status: output.status.to_string(),
        stderr: output.stderr.trim().to_string(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[test]
    fn test_captures_stdout_and_stderr() {
        let output = run_with_timeout(sh("echo out; echo err 1>&2"), Duration::from_secs(10)).unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[test]
    fn test_timeout_kills_child() {
        let result = run_with_timeout(sh("sleep 5"), Duration::from_millis(100));
        assert!(matches!(result, Err(Error::ProcessTimeout { .. })));
    }

    #[test]
    fn test_missing_program_is_process_failure() {
        let cmd = Command::new("impactmap-no-such-program");
        let result = run_with_timeout(cmd, Duration::from_secs(1));
        assert!(matches!(result, Err(Error::ProcessFailure { .. })));
    }

    #[test]
    fn test_run_checked_reports_stderr() {
        let err = run_checked(sh("echo boom 1>&2; exit 3"), Duration::from_secs(10)).unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(err.to_string().contains("sh -c"));
    }

    #[test]
    fn test_exit_code_is_exposed() {
        let output = run_with_timeout(sh("exit 1"), Duration::from_secs(10)).unwrap();
        assert_eq!(output.code(), Some(1));
    }
}
