//! External program execution.
//!
//! Provides [`run_argv`], which spawns an [`ArgumentVector`] directly (no
//! shell), captures stdout/stderr in full, and measures wall-clock time.
//! Stdout can also be mirrored line by line into a progress log so callers
//! can watch a run that has not finished yet.
//! The child is never killed by this module: once started it runs until it
//! exits on its own.

use std::io::SeekFrom;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::process::Command;

use crate::command::ArgumentVector;

/// File name of the progress log inside a job workspace.
pub const PROGRESS_FILE: &str = "progress";

/// Upper bound on how much of the progress log [`read_progress_tail`] returns.
pub const PROGRESS_TAIL_BYTES: u64 = 8 * 1024;

/// Captured result of one external program run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutput {
    /// Exit code, or `None` if the process was terminated by a signal or
    /// could not be started.
    pub exit_code: Option<i32>,
    /// Complete stdout captured from the process.
    pub stdout: String,
    /// Complete stderr captured from the process. Holds the spawn error
    /// message when the program could not be started.
    pub stderr: String,
    /// Wall-clock duration in seconds.
    pub duration_secs: f64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn spawn_failure(err: std::io::Error, elapsed: Duration) -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: format!("failed to start process: {err}"),
            duration_secs: elapsed.as_secs_f64(),
        }
    }
}

/// Spawn `argv` with `working_dir` as the current directory and wait for it.
///
/// `on_spawn` receives the OS process id as soon as the child is running.
/// When `progress_log` is given, stdout is appended to it as it arrives.
/// Spawn failures are folded into the returned output (no exit code, error in
/// stderr) so every run yields exactly one [`ProcessOutput`].
pub async fn run_argv(
    argv: &ArgumentVector,
    working_dir: &Path,
    progress_log: Option<&Path>,
    on_spawn: impl FnOnce(Option<u32>),
) -> ProcessOutput {
    let start = Instant::now();

    let mut cmd = Command::new(argv.program());
    cmd.args(argv.to_os_args())
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            on_spawn(None);
            return ProcessOutput::spawn_failure(e, start.elapsed());
        }
    };
    on_spawn(child.id());

    let log = match progress_log {
        Some(path) => match tokio::fs::File::create(path).await {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot open progress log");
                None
            }
        },
        None => None,
    };

    // Drain both pipes concurrently so a chatty child cannot block on a full pipe.
    let stdout_task = tokio::spawn(read_stream_into(child.stdout.take(), log));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    let status = child.wait().await;
    let stdout_bytes = stdout_task.await.unwrap_or_default();
    let stderr_bytes = stderr_task.await.unwrap_or_default();
    let duration_secs = start.elapsed().as_secs_f64();

    let stdout = String::from_utf8_lossy(&stdout_bytes).into_owned();
    let mut stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();

    let exit_code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            stderr.push_str(&format!("\nfailed to wait for process: {e}"));
            None
        }
    };

    ProcessOutput {
        exit_code,
        stdout,
        stderr,
        duration_secs,
    }
}

/// Read an entire output stream into a byte buffer.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = h.read_to_end(&mut buf).await;
    }
    buf
}

/// Like [`read_stream`], also appending every chunk to `log`. A failing log
/// write stops the mirroring but never the capture.
async fn read_stream_into<R: AsyncRead + Unpin>(
    handle: Option<R>,
    mut log: Option<tokio::fs::File>,
) -> Vec<u8> {
    let mut buf = Vec::new();
    let Some(mut h) = handle else {
        return buf;
    };
    let mut chunk = [0u8; 8192];
    loop {
        let n = match h.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if let Some(file) = log.as_mut() {
            let written = async {
                file.write_all(&chunk[..n]).await?;
                file.flush().await
            }
            .await;
            if let Err(e) = written {
                tracing::warn!(error = %e, "Progress log write failed; mirroring stopped");
                log = None;
            }
        }
    }
    buf
}

/// Last [`PROGRESS_TAIL_BYTES`] of the workspace progress log, starting at a
/// line boundary. `None` when the log does not exist or is empty.
pub async fn read_progress_tail(workspace: &Path) -> Option<String> {
    let mut file = tokio::fs::File::open(workspace.join(PROGRESS_FILE)).await.ok()?;
    let len = file.metadata().await.ok()?.len();
    let start = len.saturating_sub(PROGRESS_TAIL_BYTES);
    file.seek(SeekFrom::Start(start)).await.ok()?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).await.ok()?;

    let text = String::from_utf8_lossy(&bytes);
    let text = match (start > 0, text.find('\n')) {
        (true, Some(newline)) => &text[newline + 1..],
        _ => &text[..],
    };
    (!text.is_empty()).then(|| text.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ArgumentVector {
        ArgumentVector::new(vec!["sh".into(), "-c".into(), script.into()])
    }

    #[tokio::test]
    async fn captures_stdout_stderr_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_argv(&sh("echo hello; echo oops >&2; exit 3"), dir.path(), None, |_| {}).await;
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.stderr, "oops\n");
        assert!(!out.success());
        assert!(out.duration_secs >= 0.0);
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_argv(&sh("touch marker"), dir.path(), None, |_| {}).await;
        assert!(out.success());
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn arguments_are_not_shell_interpreted() {
        let dir = tempfile::tempdir().unwrap();
        let argv = ArgumentVector::new(vec!["echo".into(), "$(touch pwned); x".into()]);
        let out = run_argv(&argv, dir.path(), None, |_| {}).await;
        assert_eq!(out.stdout, "$(touch pwned); x\n");
        assert!(!dir.path().join("pwned").exists());
    }

    #[tokio::test]
    async fn reports_pid_on_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let mut seen = None;
        run_argv(&sh("true"), dir.path(), None, |pid| seen = pid).await;
        assert!(seen.is_some());
    }

    #[tokio::test]
    async fn missing_program_is_folded_into_output() {
        let dir = tempfile::tempdir().unwrap();
        let argv = ArgumentVector::new(vec!["/nonexistent/program".into()]);
        let mut called = false;
        let out = run_argv(&argv, dir.path(), None, |pid| {
            called = true;
            assert!(pid.is_none());
        })
        .await;
        assert!(called);
        assert_eq!(out.exit_code, None);
        assert!(out.stderr.contains("failed to start process"));
    }

    #[tokio::test]
    async fn large_output_is_captured_in_full() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_argv(
            &sh("i=0; while [ $i -lt 20000 ]; do echo 0123456789; i=$((i+1)); done"),
            dir.path(),
            None,
            |_| {},
        )
        .await;
        assert!(out.success());
        assert_eq!(out.stdout.len(), 20000 * 11);
    }

    #[tokio::test]
    async fn stdout_is_mirrored_into_progress_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join(PROGRESS_FILE);
        let out = run_argv(
            &sh("echo step 1; echo step 2; echo oops >&2"),
            dir.path(),
            Some(&log),
            |_| {},
        )
        .await;
        assert!(out.success());
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "step 1\nstep 2\n");
        assert_eq!(out.stdout, "step 1\nstep 2\n");
        assert_eq!(
            read_progress_tail(dir.path()).await.as_deref(),
            Some("step 1\nstep 2\n")
        );
    }

    #[tokio::test]
    async fn progress_is_readable_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join(PROGRESS_FILE);
        let argv = sh("echo started; while [ ! -e go ]; do sleep 0.05; done; echo done");
        let workspace = dir.path().to_path_buf();
        let run = tokio::spawn(async move { run_argv(&argv, &workspace, Some(&log), |_| {}).await });

        let mut seen = None;
        for _ in 0..100 {
            seen = read_progress_tail(dir.path()).await;
            if seen.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(seen.as_deref(), Some("started\n"));

        std::fs::write(dir.path().join("go"), "").unwrap();
        let out = run.await.unwrap();
        assert_eq!(out.stdout, "started\ndone\n");
    }

    #[tokio::test]
    async fn progress_tail_starts_at_line_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let line = "x".repeat(99);
        let content: String = (0..200).map(|_| format!("{line}\n")).collect();
        std::fs::write(dir.path().join(PROGRESS_FILE), &content).unwrap();

        let tail = read_progress_tail(dir.path()).await.unwrap();
        assert!(tail.len() as u64 <= PROGRESS_TAIL_BYTES);
        assert!(tail.starts_with('x'));
        assert!(tail.lines().all(|l| l.len() == 99));
        assert!(read_progress_tail(&dir.path().join("missing")).await.is_none());
    }
}
