//! Isolated execution of candidate parser modules.
//!
//! Each candidate runs in a fresh scratch directory with its own copy of the
//! source, so nothing a faulting candidate does can leak into the next
//! attempt. All candidate faults are captured as [`ExecutionResult::Failed`]
//! data; only harness-internal problems (scratch dir creation and the like)
//! surface as errors.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use jsonschema::Draft;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::table::Table;
use crate::core::types::{Diagnostic, ExecutionResult, Stage};
use crate::io::process::run_command_with_timeout;

const TABLE_SCHEMA: &str = include_str!("../../schemas/table.schema.json");

static TABLE_VALIDATOR: LazyLock<jsonschema::Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(TABLE_SCHEMA).expect("embedded table schema should be valid json");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("embedded table schema should compile")
});

/// Parameters for one candidate execution.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Command prefix used to run the module
    /// (`<command...> <module> <input> <output>`).
    pub interpreter: Vec<String>,
    /// File name the candidate source is written under in the scratch dir.
    pub module_filename: String,
    /// Candidate source text.
    pub source: String,
    /// Sample document fed to the candidate.
    pub sample_path: PathBuf,
    /// Path to persist the candidate's stdout/stderr log.
    pub log_path: PathBuf,
    /// Maximum time to wait for the candidate.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Run a candidate module against the sample input.
///
/// The module must write its parsed table as JSON (`{columns, rows}`) to the
/// output path it is given as its second argument. Load errors, runtime
/// failures, timeouts, and output-contract violations all come back as
/// `Failed` diagnostics.
#[instrument(skip_all, fields(module = %request.module_filename, timeout_secs = request.timeout.as_secs()))]
pub fn run_candidate(request: &ExecRequest) -> Result<ExecutionResult> {
    let Some((program, args)) = request.interpreter.split_first() else {
        return Ok(failed(
            "interpreter command is empty",
            None,
        ));
    };

    let scratch = tempfile::tempdir().context("create scratch dir")?;
    let module_path = scratch.path().join(&request.module_filename);
    fs::write(&module_path, &request.source)
        .with_context(|| format!("write candidate {}", module_path.display()))?;
    let output_path = scratch.path().join("output.json");

    info!(workdir = %scratch.path().display(), "running candidate");
    let mut cmd = Command::new(program);
    cmd.args(args)
        .arg(&module_path)
        .arg(&request.sample_path)
        .arg(&output_path)
        .current_dir(scratch.path());

    let output = match run_command_with_timeout(
        cmd,
        None,
        request.timeout,
        request.output_limit_bytes,
    ) {
        Ok(output) => output,
        Err(err) => {
            // Spawn failures (missing interpreter and the like) are candidate
            // environment faults, recoverable like any other execution failure.
            warn!(err = %err, "candidate spawn failed");
            return Ok(failed(&format!("failed to start candidate: {err:#}"), None));
        }
    };

    write_exec_log(&request.log_path, &output.render_log("candidate"))?;

    if output.timed_out {
        warn!(timeout_secs = request.timeout.as_secs(), "candidate timed out");
        return Ok(failed(
            &format!("candidate timed out after {}s", request.timeout.as_secs()),
            None,
        ));
    }
    if !output.status.success() {
        warn!(exit_code = ?output.status.code(), "candidate exited nonzero");
        return Ok(failed(
            &format!("candidate exited with status {:?}", output.status.code()),
            Some(output.stderr_lossy()),
        ));
    }
    if !output_path.is_file() {
        return Ok(failed(
            "candidate wrote no output table (expected JSON at the output path argument)",
            Some(output.stderr_lossy()),
        ));
    }

    let contents = fs::read_to_string(&output_path)
        .with_context(|| format!("read candidate output {}", output_path.display()))?;
    match load_output_table(&contents) {
        Ok(table) => {
            debug!(rows = table.row_count(), "candidate produced a table");
            Ok(ExecutionResult::Produced { table })
        }
        Err(reason) => Ok(failed("candidate output violates the table contract", Some(reason))),
    }
}

/// Validate candidate output against the embedded schema, then parse it.
fn load_output_table(contents: &str) -> Result<Table, String> {
    let value: Value =
        serde_json::from_str(contents).map_err(|err| format!("output is not valid json: {err}"))?;
    let messages: Vec<String> = TABLE_VALIDATOR
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(format!("schema violations:\n- {}", messages.join("\n- ")));
    }
    Table::from_json_str(contents).map_err(|err| format!("{err:#}"))
}

fn failed(message: &str, detail: Option<String>) -> ExecutionResult {
    let mut diagnostic = Diagnostic::new(Stage::Execute, message);
    if let Some(detail) = detail.filter(|d| !d.trim().is_empty()) {
        diagnostic = diagnostic.with_detail(detail);
    }
    ExecutionResult::Failed { diagnostic }
}

fn write_exec_log(path: &Path, log: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create exec log dir {}", parent.display()))?;
    }
    fs::write(path, log).with_context(|| format!("write exec log {}", path.display()))
}
