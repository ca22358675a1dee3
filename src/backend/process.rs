//! Subprocess helpers shared by the external-tool backends.
//!
//! Children are spawned with `kill_on_drop(true)`: when a timeout drops the
//! `wait_with_output` future, the tool is killed instead of running on in
//! the background and racing a later backend for the staging file.

use crate::error::BackendError;
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Bytes of stderr kept in a [`BackendError::ToolFailed`].
const STDERR_TAIL: usize = 2000;

/// Run `<program> --version` and return its first output line.
///
/// `Err` carries a human-readable reason (not found, non-zero exit,
/// timed out).
pub async fn probe_tool(program: &OsStr, timeout_secs: u64) -> Result<String, String> {
    let label = program.to_string_lossy().to_string();
    let child = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(format!("'{label}' not found"));
        }
        Err(e) => return Err(format!("'{label}' could not be started: {e}")),
    };

    let output = match tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        child.wait_with_output(),
    )
    .await
    {
        Ok(Ok(o)) => o,
        Ok(Err(e)) => return Err(format!("'{label} --version' failed: {e}")),
        Err(_) => return Err(format!("'{label} --version' timed out after {timeout_secs}s")),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let first = stderr.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        return Err(format!(
            "'{label} --version' exited with {}{}{}",
            output.status,
            if first.is_empty() { "" } else { ": " },
            first.trim()
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stdout
        .lines()
        .chain(stderr.lines())
        .find(|l| !l.trim().is_empty())
        .unwrap_or(label.as_str())
        .trim()
        .to_string();
    debug!("Probe {}: {}", label, line);
    Ok(line)
}

/// Run a conversion tool to completion.
///
/// Spawn failure with `NotFound` maps to [`BackendError::Unavailable`]
/// (the tool vanished after the probe), a non-zero exit to
/// [`BackendError::ToolFailed`] with the tail of stderr, and exceeding
/// `timeout_secs` to [`BackendError::Timeout`] after the child is killed.
pub async fn run_tool<I, S>(
    backend: &str,
    program: &OsStr,
    args: I,
    cwd: Option<&Path>,
    timeout_secs: u64,
) -> Result<(), BackendError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let tool = program.to_string_lossy().to_string();
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    debug!("{}: running {:?}", backend, cmd.as_std());

    let child = cmd.spawn().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            BackendError::Unavailable {
                backend: backend.to_string(),
                reason: format!("'{tool}' not found"),
            }
        } else {
            BackendError::io(backend, format!("failed to start '{tool}': {e}"))
        }
    })?;

    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
        .await
        .map_err(|_| BackendError::Timeout {
            backend: backend.to_string(),
            secs: timeout_secs,
        })?
        .map_err(|e| BackendError::io(backend, format!("'{tool}' execution failed: {e}")))?;

    if !output.status.success() {
        return Err(BackendError::ToolFailed {
            backend: backend.to_string(),
            tool,
            status: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        });
    }
    Ok(())
}

/// Last [`STDERR_TAIL`] bytes of stderr, trimmed, on a char boundary.
pub fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &text[start..])
}
