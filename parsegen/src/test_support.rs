//! Test-only helpers: scripted backends, shell candidate modules, and
//! project fixtures laid out by the data-directory convention.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::io::backend::{GenerationRequest, TextBackend};
use crate::io::config::{AgentConfig, InterpreterConfig};
use crate::io::paths::ProjectPaths;
use crate::io::target::{TargetSpec, resolve_target};

/// Backend returning queued replies without spawning processes.
///
/// `Err` entries simulate backend failures (unreachable, timed out); an
/// exhausted queue also fails, so over-consumption shows up in tests.
pub struct ScriptedBackend {
    replies: RefCell<VecDeque<Result<String, String>>>,
    consumed: Cell<usize>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: RefCell::new(replies.into_iter().collect()),
            consumed: Cell::new(0),
        }
    }

    /// Number of replies handed out so far.
    pub fn consumed(&self) -> usize {
        self.consumed.get()
    }

    pub fn consumed_any(&self) -> bool {
        self.consumed() > 0
    }
}

impl TextBackend for ScriptedBackend {
    fn complete(&self, _request: &GenerationRequest) -> Result<String> {
        self.consumed.set(self.consumed.get() + 1);
        match self.replies.borrow_mut().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!("{message}")),
            None => Err(anyhow!("scripted backend exhausted")),
        }
    }
}

/// Candidate source for the `sh` interpreter that writes `json` to its
/// output path argument.
pub fn sh_module_emitting(json: &str) -> String {
    format!("printf '%s' '{json}' > \"$2\"\n")
}

/// Candidate source for the `sh` interpreter that fails with `message` on
/// stderr.
pub fn sh_module_failing(message: &str) -> String {
    format!("echo \"{message}\" >&2\nexit 3\n")
}

/// Table interchange JSON for candidate outputs.
pub fn table_json(columns: &[&str], rows: &[&[&str]]) -> String {
    let value = serde_json::json!({
        "columns": columns,
        "rows": rows,
    });
    value.to_string()
}

/// Temp project with the conventional layout and an `sh` interpreter config,
/// so candidates run as plain shell scripts.
pub struct TestProject {
    temp: TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp: tempfile::tempdir()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn paths(&self) -> ProjectPaths {
        ProjectPaths::new(self.root())
    }

    pub fn config(&self) -> AgentConfig {
        AgentConfig {
            generation_timeout_secs: 5,
            execution_timeout_secs: 5,
            module_extension: "sh".to_string(),
            interpreter: InterpreterConfig {
                command: vec!["sh".to_string()],
            },
            ..AgentConfig::default()
        }
    }

    /// Seed `data/<name>/` with an expected CSV and a sample document.
    pub fn seed_target(&self, name: &str, expected_csv: &str, sample: &[u8]) -> Result<()> {
        let dir = self.root().join("data").join(name);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(format!("{name}_sample.csv")), expected_csv)?;
        fs::write(dir.join(format!("{name}_sample.txt")), sample)?;
        Ok(())
    }

    pub fn resolve(&self, name: &str, max_attempts: Option<u32>) -> Result<TargetSpec> {
        resolve_target(&self.paths(), &self.config(), name, max_attempts)
    }
}
