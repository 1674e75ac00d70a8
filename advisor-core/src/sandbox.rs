//! Sandboxed executor for screened chart code
//!
//! Each run gets a fresh `advisor-exec-*` working directory holding
//! `script.py`. The interpreter runs with that directory as cwd, in its own
//! process group, under a wall-clock timeout enforced here, not by the
//! child. Nothing the script started outlives the call. The directory is
//! removed on every exit path: explicitly on return, and by `TempDir`'s drop
//! on early returns and panics.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::config::ExecutionConfig;
use crate::models::{ExecutionFailure, ExecutionResult};
use crate::synth::ARTIFACT_FILENAME;

pub const SCRIPT_FILENAME: &str = "script.py";
pub const ARTIFACT_MIME: &str = "image/png";
const WORKDIR_PREFIX: &str = "advisor-exec-";
const MAX_STDERR_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    interpreter: String,
    scratch_root: PathBuf,
}

impl SandboxExecutor {
    pub fn new(interpreter: impl Into<String>, scratch_root: PathBuf) -> Self {
        Self {
            interpreter: interpreter.into(),
            scratch_root,
        }
    }

    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self::new(config.interpreter.clone(), config.scratch_root())
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    /// Run `code` once. Never returns an error; every failure is in the result.
    pub async fn execute(&self, code: &str, timeout: Duration) -> ExecutionResult {
        if let Err(e) = tokio::fs::create_dir_all(&self.scratch_root).await {
            return ExecutionResult::failed(ExecutionFailure::Internal(format!(
                "scratch root unavailable: {e}"
            )));
        }

        let workdir = match tempfile::Builder::new()
            .prefix(WORKDIR_PREFIX)
            .tempdir_in(&self.scratch_root)
        {
            Ok(dir) => dir,
            Err(e) => {
                return ExecutionResult::failed(ExecutionFailure::Internal(format!(
                    "could not create working directory: {e}"
                )))
            }
        };

        let started = std::time::Instant::now();
        let result = self.run_in(workdir.path(), code, timeout).await;

        let path = workdir.path().to_path_buf();
        if let Err(e) = workdir.close() {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Failed to remove working directory"
            );
        }

        tracing::info!(
            success = result.success,
            exit_code = ?result.exit_code,
            error = ?result.error,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sandboxed execution finished"
        );
        result
    }

    async fn run_in(&self, dir: &Path, code: &str, timeout: Duration) -> ExecutionResult {
        if let Err(e) = tokio::fs::write(dir.join(SCRIPT_FILENAME), code).await {
            return ExecutionResult::failed(ExecutionFailure::Internal(format!(
                "could not write script: {e}"
            )));
        }

        let mut command = Command::new(&self.interpreter);
        command
            .arg(SCRIPT_FILENAME)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so background children can be killed with the script.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionResult::failed(ExecutionFailure::Internal(format!(
                    "could not start {}: {e}",
                    self.interpreter
                )))
            }
        };
        let group = child.id();

        let mut stdout_task = child.stdout.take().map(drain);
        let mut stderr_task = child.stderr.take().map(drain);

        // One deadline covers the exit and both pipe drains.
        let run = async {
            let status = child.wait().await?;
            kill_group(group);
            let stdout = collect(stdout_task.as_mut()).await;
            let stderr = collect(stderr_task.as_mut()).await;
            Ok::<_, std::io::Error>((status, stdout, stderr))
        };

        let outcome = tokio::time::timeout(timeout, run).await;
        let (status, stdout, stderr) = match outcome {
            Ok(Ok(finished)) => finished,
            Ok(Err(e)) => {
                kill_group(group);
                abort(stdout_task);
                abort(stderr_task);
                return ExecutionResult::failed(ExecutionFailure::Internal(format!(
                    "wait failed: {e}"
                )));
            }
            Err(_) => {
                kill_group(group);
                // kill() also reaps, so no zombie outlives this call.
                if let Err(e) = child.kill().await {
                    tracing::error!(error = %e, "Failed to kill timed-out child");
                }
                abort(stdout_task);
                abort(stderr_task);
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Execution timed out");
                return ExecutionResult::failed(ExecutionFailure::Timeout);
            }
        };

        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = truncate_chars(&String::from_utf8_lossy(&stderr), MAX_STDERR_CHARS);
        let exit_code = status.code();

        let image = tokio::fs::read(dir.join(ARTIFACT_FILENAME))
            .await
            .ok()
            .filter(|bytes| !bytes.is_empty());

        match image {
            Some(bytes) => {
                ExecutionResult::with_image(exit_code, stdout, stderr, bytes, ARTIFACT_MIME)
            }
            None => ExecutionResult {
                success: false,
                exit_code,
                stdout,
                stderr,
                image_bytes: None,
                mime_type: None,
                error: Some(ExecutionFailure::NoArtifactProduced),
            },
        }
    }
}

fn drain<R>(mut reader: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf).await;
        buf
    })
}

async fn collect(task: Option<&mut JoinHandle<Vec<u8>>>) -> Vec<u8> {
    match task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

/// SIGKILL every process in the script's group. The group id is the
/// script's pid; a group that is already gone is not an error.
#[cfg(unix)]
fn kill_group(group: Option<u32>) {
    let Some(pgid) = group.and_then(|id| libc::pid_t::try_from(id).ok()) else {
        return;
    };
    unsafe {
        let _ = libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>) {}

fn abort(task: Option<JoinHandle<Vec<u8>>>) {
    if let Some(handle) = task {
        handle.abort();
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // `sh` runs script.py as a shell script, which exercises the process
    // plumbing without needing a Python install.
    fn shell_executor(scratch: &Path) -> SandboxExecutor {
        SandboxExecutor::new("sh", scratch.to_path_buf())
    }

    fn assert_scratch_empty(scratch: &Path) {
        let leftovers: Vec<_> = std::fs::read_dir(scratch).unwrap().collect();
        assert!(leftovers.is_empty(), "working directory left behind: {leftovers:?}");
    }

    // A killed orphan may linger as a zombie until init reaps it; that counts
    // as gone. Returns whether the process is still running after ~2s.
    async fn wait_until_gone(pid: &str) -> bool {
        for _ in 0..40 {
            let running = std::fs::read_to_string(format!("/proc/{pid}/stat"))
                .ok()
                .and_then(|stat| {
                    let state = stat.rsplit_once(')')?.1.trim_start().chars().next()?;
                    Some(state != 'Z' && state != 'X')
                })
                .unwrap_or(false);
            if !running {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }

    fn has_python_with(module: &str) -> bool {
        std::process::Command::new("python3")
            .args(["-c", &format!("import {module}")])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_artifact_captured_and_workdir_removed() {
        let scratch = tempfile::tempdir().unwrap();
        let result = shell_executor(scratch.path())
            .execute("printf 'PNGDATA' > graph_output.png\necho done", Duration::from_secs(10))
            .await;

        assert!(result.success, "{result:?}");
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.image_bytes.as_deref(), Some(&b"PNGDATA"[..]));
        assert_eq!(result.mime_type.as_deref(), Some("image/png"));
        assert_eq!(result.stdout, "done\n");
        assert_scratch_empty(scratch.path());
    }

    #[tokio::test]
    async fn test_clean_exit_without_artifact() {
        let scratch = tempfile::tempdir().unwrap();
        let result = shell_executor(scratch.path())
            .execute("echo hello", Duration::from_secs(10))
            .await;

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.error, Some(ExecutionFailure::NoArtifactProduced));
        assert!(result.image_bytes.is_none());
        assert_scratch_empty(scratch.path());
    }

    #[tokio::test]
    async fn test_empty_artifact_counts_as_missing() {
        let scratch = tempfile::tempdir().unwrap();
        let result = shell_executor(scratch.path())
            .execute(": > graph_output.png", Duration::from_secs(10))
            .await;
        assert_eq!(result.error, Some(ExecutionFailure::NoArtifactProduced));
    }

    #[tokio::test]
    async fn test_nonzero_exit_with_artifact_is_failure() {
        let scratch = tempfile::tempdir().unwrap();
        let result = shell_executor(scratch.path())
            .execute(
                "printf 'x' > graph_output.png\necho boom >&2\nexit 3",
                Duration::from_secs(10),
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.error, Some(ExecutionFailure::ExecutionFailed));
        assert!(result.stderr.contains("boom"));
        assert_scratch_empty(scratch.path());
    }

    #[tokio::test]
    async fn test_stderr_truncated() {
        let scratch = tempfile::tempdir().unwrap();
        let result = shell_executor(scratch.path())
            .execute(
                "head -c 5000 /dev/zero | tr '\\000' x >&2\nexit 1",
                Duration::from_secs(10),
            )
            .await;
        assert_eq!(result.stderr.chars().count(), MAX_STDERR_CHARS);
    }

    #[tokio::test]
    async fn test_timeout_kills_child_and_cleans_up() {
        let scratch = tempfile::tempdir().unwrap();
        let pid_dir = tempfile::tempdir().unwrap();
        let pid_file = pid_dir.path().join("pid");

        let code = format!("echo $$ > '{}'\nexec sleep 30", pid_file.display());
        let started = std::time::Instant::now();
        let result = shell_executor(scratch.path())
            .execute(&code, Duration::from_millis(500))
            .await;

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!result.success);
        assert_eq!(result.error, Some(ExecutionFailure::Timeout));
        assert_scratch_empty(scratch.path());

        if cfg!(target_os = "linux") {
            let pid = std::fs::read_to_string(&pid_file).unwrap();
            assert!(!wait_until_gone(pid.trim()).await, "child {pid} still running");
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_background_children() {
        let scratch = tempfile::tempdir().unwrap();
        let pid_dir = tempfile::tempdir().unwrap();
        let pid_file = pid_dir.path().join("pid");

        let code = format!("sleep 30 &\necho $! > '{}'\nwait", pid_file.display());
        let started = std::time::Instant::now();
        let result = shell_executor(scratch.path())
            .execute(&code, Duration::from_millis(500))
            .await;

        assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
        assert_eq!(result.error, Some(ExecutionFailure::Timeout));
        assert_scratch_empty(scratch.path());

        if cfg!(target_os = "linux") {
            let pid = std::fs::read_to_string(&pid_file).unwrap();
            assert!(!wait_until_gone(pid.trim()).await, "background {pid} still running");
        }
    }

    #[tokio::test]
    async fn test_exited_script_does_not_wait_for_background_children() {
        let scratch = tempfile::tempdir().unwrap();
        let pid_dir = tempfile::tempdir().unwrap();
        let pid_file = pid_dir.path().join("pid");

        // The background sleep inherits stdout and stderr.
        let code = format!(
            "sleep 30 &\necho $! > '{}'\nprintf x > graph_output.png",
            pid_file.display()
        );
        let started = std::time::Instant::now();
        let result = shell_executor(scratch.path())
            .execute(&code, Duration::from_secs(5))
            .await;

        assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
        assert!(result.success, "{result:?}");
        assert_eq!(result.image_bytes.as_deref(), Some(&b"x"[..]));
        assert_scratch_empty(scratch.path());

        if cfg!(target_os = "linux") {
            let pid = std::fs::read_to_string(&pid_file).unwrap();
            assert!(!wait_until_gone(pid.trim()).await, "background {pid} still running");
        }
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_internal_failure() {
        let scratch = tempfile::tempdir().unwrap();
        let executor = SandboxExecutor::new("/nonexistent/python3", scratch.path().to_path_buf());
        let result = executor.execute("print(1)", Duration::from_secs(5)).await;

        assert!(!result.success);
        assert!(matches!(result.error, Some(ExecutionFailure::Internal(_))));
        assert_scratch_empty(scratch.path());
    }

    #[tokio::test]
    async fn test_concurrent_runs_do_not_interfere() {
        let scratch = tempfile::tempdir().unwrap();
        let executor = shell_executor(scratch.path());

        let (a, b) = tokio::join!(
            executor.execute("printf 'A' > graph_output.png", Duration::from_secs(10)),
            executor.execute("printf 'B' > graph_output.png", Duration::from_secs(10)),
        );
        assert_eq!(a.image_bytes.as_deref(), Some(&b"A"[..]));
        assert_eq!(b.image_bytes.as_deref(), Some(&b"B"[..]));
        assert_scratch_empty(scratch.path());
    }

    #[tokio::test]
    async fn test_python_infinite_loop_times_out() {
        if !has_python_with("sys") {
            eprintln!("python3 not available, skipping");
            return;
        }
        let scratch = tempfile::tempdir().unwrap();
        let executor = SandboxExecutor::new("python3", scratch.path().to_path_buf());
        let result = executor
            .execute("while True:\n    pass\n", Duration::from_secs(1))
            .await;
        assert_eq!(result.error, Some(ExecutionFailure::Timeout));
        assert_scratch_empty(scratch.path());
    }

    #[tokio::test]
    async fn test_python_matplotlib_renders_png() {
        if !has_python_with("matplotlib") {
            eprintln!("matplotlib not available, skipping");
            return;
        }
        let scratch = tempfile::tempdir().unwrap();
        let executor = SandboxExecutor::new("python3", scratch.path().to_path_buf());
        let code = crate::synth::normalize_code("plt.plot([1, 2, 3], [1, 4, 9])");
        let result = executor.execute(&code, Duration::from_secs(60)).await;

        assert!(result.success, "{result:?}");
        let bytes = result.image_bytes.unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
        assert_scratch_empty(scratch.path());
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("привет", 3), "при");
        assert_eq!(truncate_chars("ok", 10), "ok");
    }
}
