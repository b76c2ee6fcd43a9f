//! Text-generation backend abstraction.
//!
//! The [`TextBackend`] trait decouples the generation stage from the actual
//! model invocation (by default a `codex exec` subprocess). Tests use
//! scripted backends that return predetermined replies without spawning
//! processes. Swapping the backend never touches the retry loop.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;

/// Parameters for one backend invocation.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Prompt text piped to the backend.
    pub prompt: String,
    /// Path to persist the backend's stdout/stderr log.
    pub log_path: PathBuf,
    /// Maximum time to wait for a reply.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Capability interface: strategy text in, source text out.
pub trait TextBackend {
    /// Produce a reply for the request, or fail with a structured error.
    fn complete(&self, request: &GenerationRequest) -> Result<String>;
}

/// Backend that pipes the prompt to a configurable command and reads the
/// reply from its stdout.
pub struct CommandBackend {
    command: Vec<String>,
}

impl CommandBackend {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl TextBackend for CommandBackend {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let Some((program, args)) = self.command.split_first() else {
            bail!("backend command is empty");
        };
        info!(program = %program, "invoking text backend");

        let mut cmd = Command::new(program);
        cmd.args(args);
        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run backend '{program}'"))?;

        write_backend_log(&request.log_path, &output.render_log("backend"))?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "backend timed out");
            return Err(anyhow!(
                "backend timed out after {}s",
                request.timeout.as_secs()
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "backend failed");
            return Err(anyhow!(
                "backend exited with status {:?}: {}",
                output.status.code(),
                truncate_for_message(&output.stderr_lossy())
            ));
        }

        debug!(reply_bytes = output.stdout.len(), "backend reply received");
        Ok(output.stdout_lossy())
    }
}

fn write_backend_log(path: &Path, log: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create backend log dir {}", parent.display()))?;
    }
    fs::write(path, log).with_context(|| format!("write backend log {}", path.display()))
}

fn truncate_for_message(text: &str) -> String {
    const LIMIT: usize = 400;
    let trimmed = text.trim();
    if trimmed.len() <= LIMIT {
        return trimmed.to_string();
    }
    let mut end = LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(temp: &tempfile::TempDir) -> GenerationRequest {
        GenerationRequest {
            prompt: "write a parser".to_string(),
            log_path: temp.path().join("backend.log"),
            timeout: Duration::from_secs(5),
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn echoes_stdout_as_reply_and_writes_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = CommandBackend::new(vec!["cat".to_string()]);

        let reply = backend.complete(&request(&temp)).expect("reply");
        assert_eq!(reply, "write a parser");

        let log = fs::read_to_string(temp.path().join("backend.log")).expect("log");
        assert!(log.contains("=== stdout ==="));
        assert!(log.contains("write a parser"));
    }

    #[test]
    fn nonzero_exit_is_an_error_with_stderr() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = CommandBackend::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo nope >&2; exit 7".to_string(),
        ]);

        let err = backend.complete(&request(&temp)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("status"));
        assert!(msg.contains("nope"));
    }

    #[test]
    fn timeout_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = CommandBackend::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "sleep 5".to_string(),
        ]);
        let mut req = request(&temp);
        req.timeout = Duration::from_millis(100);

        let err = backend.complete(&req).unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn missing_binary_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = CommandBackend::new(vec!["definitely-not-a-real-binary-xyz".to_string()]);
        assert!(backend.complete(&request(&temp)).is_err());
    }
}
