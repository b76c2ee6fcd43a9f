//! Run artifact persistence under `.parsegen/runs/<target>/<run-id>/`.
//!
//! Every attempt leaves its plan, candidate source, and stage logs behind in
//! a deterministic layout; the run report is written for both terminal
//! outcomes so failed runs stay inspectable.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{Attempt, AttemptOutcome, RunReport};

/// Stable paths for one run's artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub run_dir: PathBuf,
    pub report_path: PathBuf,
}

impl RunPaths {
    pub fn new(runs_dir: &Path, target: &str, run_id: &str) -> Self {
        let run_dir = runs_dir.join(target).join(run_id);
        Self {
            report_path: run_dir.join("report.json"),
            run_dir,
        }
    }

    pub fn attempt_dir(&self, index: u32) -> PathBuf {
        self.run_dir.join(format!("attempt-{index}"))
    }

    pub fn backend_log_path(&self, index: u32) -> PathBuf {
        self.attempt_dir(index).join("backend.log")
    }

    pub fn exec_log_path(&self, index: u32) -> PathBuf {
        self.attempt_dir(index).join("exec.log")
    }
}

/// Persist one recorded attempt's artifacts.
///
/// Written in deterministic order: `plan.md`, the candidate module (when one
/// exists), then `attempt.json` with the full structured record.
pub fn write_attempt(paths: &RunPaths, attempt: &Attempt, module_extension: &str) -> Result<()> {
    let dir = paths.attempt_dir(attempt.index);
    fs::create_dir_all(&dir).with_context(|| format!("create attempt dir {}", dir.display()))?;

    write_text(&dir.join("plan.md"), &attempt.plan.strategy)?;

    let module = match &attempt.outcome {
        AttemptOutcome::GenerationFailed { .. } => None,
        AttemptOutcome::ExecutionFailed { module, .. }
        | AttemptOutcome::Mismatched { module, .. }
        | AttemptOutcome::Matched { module } => Some(module),
    };
    if let Some(module) = module {
        write_text(&dir.join(format!("module.{module_extension}")), &module.source)?;
    }

    write_json(&dir.join("attempt.json"), attempt)?;
    debug!(attempt = attempt.index, dir = %dir.display(), "attempt artifacts written");
    Ok(())
}

/// Persist the run report.
pub fn write_report(paths: &RunPaths, report: &RunReport) -> Result<()> {
    fs::create_dir_all(&paths.run_dir)
        .with_context(|| format!("create run dir {}", paths.run_dir.display()))?;
    write_json(&paths.report_path, report)
}

/// Load a run report from disk.
pub fn load_report(path: &Path) -> Result<RunReport> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read report {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse report {}", path.display()))
}

/// Most recent run directory for a target (run ids sort chronologically).
pub fn latest_run_dir(runs_dir: &Path, target: &str) -> Result<PathBuf> {
    let target_dir = runs_dir.join(target);
    if !target_dir.is_dir() {
        return Err(anyhow!("no runs recorded for '{target}'"));
    }
    let mut dirs = Vec::new();
    for entry in
        fs::read_dir(&target_dir).with_context(|| format!("read {}", target_dir.display()))?
    {
        let entry = entry.context("read entry")?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    dirs.pop()
        .ok_or_else(|| anyhow!("no runs recorded for '{target}'"))
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
