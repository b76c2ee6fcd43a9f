//! Orchestration of one bounded-retry generation run.
//!
//! Drives plan -> generate -> execute -> compare through the pure state
//! machine in [`crate::core::machine`], records every attempt, and persists
//! the run report for both terminal outcomes. Recoverable failures never
//! escape this loop as errors; fatal ones (unusable inputs, harness faults)
//! abort it immediately.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::core::compare::{ComparisonResult, compare};
use crate::core::machine::{LoopEvent, LoopState, advance};
use crate::core::types::{Attempt, AttemptOutcome, ExecutionResult, RunOutcome, RunReport};
use crate::generate::{GenerateOptions, generate};
use crate::io::backend::TextBackend;
use crate::io::config::AgentConfig;
use crate::io::paths::ProjectPaths;
use crate::io::report::{RunPaths, write_attempt, write_report};
use crate::io::sandbox::{ExecRequest, run_candidate};
use crate::io::target::TargetSpec;
use crate::plan::{PlanInputs, plan};

/// Cooperative cancellation flag, checked before every attempt.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// The run was aborted by an external cancellation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCancelled;

impl std::fmt::Display for RunCancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run cancelled")
    }
}

impl std::error::Error for RunCancelled {}

/// Drive the full generation loop for one target.
///
/// Returns the run report (also persisted under the runs directory) for both
/// `Succeeded` and `Exhausted`. Errors mean the run could not reach a
/// terminal state: unusable inputs, cancellation, or a harness fault.
#[instrument(skip_all, fields(target = %target.name, max_attempts = target.max_attempts))]
pub fn run_target<B: TextBackend>(
    backend: &B,
    target: &TargetSpec,
    config: &AgentConfig,
    paths: &ProjectPaths,
    cancel: &CancelToken,
) -> Result<RunReport> {
    let started_at = Utc::now();
    let run_id = format!("run-{}", started_at.format("%Y%m%d_%H%M%S"));
    let run_paths = RunPaths::new(&paths.runs_dir, &target.name, &run_id);

    // Fatal: nothing to retry if the inputs themselves are unusable.
    let inputs = PlanInputs::load(target)?;

    let policy = config.compare_policy();
    let mut attempts: Vec<Attempt> = Vec::new();
    let mut state = LoopState::Planning;

    let outcome = loop {
        if cancel.is_cancelled() {
            return Err(anyhow!(RunCancelled));
        }
        let index = attempts.len() as u32 + 1;
        info!(attempt = index, "attempt started");

        let current_plan = plan(&inputs, &attempts, config.prompt_budget_bytes);
        state = advance(
            state,
            LoopEvent::Planned,
            attempts.len() as u32,
            target.max_attempts,
        )?;

        let generated = generate(
            backend,
            &current_plan,
            &GenerateOptions {
                log_path: run_paths.backend_log_path(index),
                timeout: config.generation_timeout(),
                output_limit_bytes: config.backend_output_limit_bytes,
                prompt_budget_bytes: config.prompt_budget_bytes,
            },
        );
        let module = match generated {
            Ok(module) => {
                state = advance(
                    state,
                    LoopEvent::Generated,
                    attempts.len() as u32,
                    target.max_attempts,
                )?;
                module
            }
            Err(err) => {
                warn!(attempt = index, err = %err, "generation failed");
                let attempt = Attempt {
                    index,
                    plan: current_plan,
                    outcome: AttemptOutcome::GenerationFailed {
                        diagnostic: err.to_diagnostic(),
                    },
                };
                write_attempt(&run_paths, &attempt, &config.module_extension)?;
                attempts.push(attempt);
                state = advance(
                    state,
                    LoopEvent::GenerationFailed,
                    attempts.len() as u32,
                    target.max_attempts,
                )?;
                if state == LoopState::Exhausted {
                    break exhausted_outcome(&attempts);
                }
                continue;
            }
        };

        let execution = run_candidate(&ExecRequest {
            interpreter: config.interpreter.command.clone(),
            module_filename: module_filename(target, config),
            source: module.source.clone(),
            sample_path: target.sample_path.clone(),
            log_path: run_paths.exec_log_path(index),
            timeout: config.execution_timeout(),
            output_limit_bytes: config.exec_output_limit_bytes,
        })?;
        let table = match execution {
            ExecutionResult::Produced { table } => {
                state = advance(
                    state,
                    LoopEvent::Produced,
                    attempts.len() as u32,
                    target.max_attempts,
                )?;
                table
            }
            ExecutionResult::Failed { diagnostic } => {
                warn!(attempt = index, "candidate execution failed");
                let attempt = Attempt {
                    index,
                    plan: current_plan,
                    outcome: AttemptOutcome::ExecutionFailed { module, diagnostic },
                };
                write_attempt(&run_paths, &attempt, &config.module_extension)?;
                attempts.push(attempt);
                state = advance(
                    state,
                    LoopEvent::ExecutionFailed,
                    attempts.len() as u32,
                    target.max_attempts,
                )?;
                if state == LoopState::Exhausted {
                    break exhausted_outcome(&attempts);
                }
                continue;
            }
        };

        match compare(&table, &inputs.expected, &policy) {
            ComparisonResult::Match => {
                info!(attempt = index, "candidate matched the expected table");
                let attempt = Attempt {
                    index,
                    plan: current_plan,
                    outcome: AttemptOutcome::Matched {
                        module: module.clone(),
                    },
                };
                write_attempt(&run_paths, &attempt, &config.module_extension)?;
                attempts.push(attempt);
                let end_state = advance(
                    state,
                    LoopEvent::Matched,
                    attempts.len() as u32,
                    target.max_attempts,
                )?;
                debug_assert!(end_state.is_terminal());
                persist_module(&target.module_path, &module.source)?;
                break RunOutcome::Succeeded {
                    module_path: target.module_path.display().to_string(),
                };
            }
            ComparisonResult::Mismatch { report } => {
                warn!(
                    attempt = index,
                    diffs = report.diffs.len(),
                    "candidate output diverged"
                );
                let attempt = Attempt {
                    index,
                    plan: current_plan,
                    outcome: AttemptOutcome::Mismatched { module, report },
                };
                write_attempt(&run_paths, &attempt, &config.module_extension)?;
                attempts.push(attempt);
                state = advance(
                    state,
                    LoopEvent::Mismatched,
                    attempts.len() as u32,
                    target.max_attempts,
                )?;
                if state == LoopState::Exhausted {
                    break exhausted_outcome(&attempts);
                }
            }
        }
    };

    let report = RunReport {
        target: target.name.clone(),
        run_id,
        started_at: started_at.to_rfc3339(),
        finished_at: Utc::now().to_rfc3339(),
        max_attempts: target.max_attempts,
        attempts,
        outcome,
    };
    write_report(&run_paths, &report)?;
    info!(
        succeeded = report.succeeded(),
        attempts = report.attempts.len(),
        "run finished"
    );
    Ok(report)
}

fn exhausted_outcome(attempts: &[Attempt]) -> RunOutcome {
    let last_failure = attempts
        .last()
        .and_then(Attempt::failure_text)
        .unwrap_or_else(|| "no failure recorded".to_string());
    RunOutcome::Exhausted { last_failure }
}

fn module_filename(target: &TargetSpec, config: &AgentConfig) -> String {
    format!("{}_parser.{}", target.name, config.module_extension)
}

fn persist_module(path: &Path, source: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create module dir {}", parent.display()))?;
    }
    fs::write(path, source).with_context(|| format!("write module {}", path.display()))
}
