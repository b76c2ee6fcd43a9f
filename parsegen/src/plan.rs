//! Planning stage: input loading plus per-attempt strategy production.
//!
//! Inputs are read once per run; a sample or reference table that cannot be
//! read is fatal for the whole run, before any attempt is recorded. Strategy
//! production itself is deterministic templating; the non-deterministic
//! backend call lives entirely in the generation stage.

use std::fmt;
use std::fs;

use crate::core::table::Table;
use crate::core::types::{Attempt, PLAN_VERSION, Plan};
use crate::io::prompt::{PromptBuilder, StrategyInputs};
use crate::io::target::TargetSpec;

/// Bytes of the sample document surfaced in the strategy.
const SAMPLE_EXCERPT_BYTES: usize = 4096;
/// Expected-table rows surfaced in the strategy.
const PREVIEW_ROWS: usize = 10;

/// Fatal planning failure: the run's inputs are unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanningError {
    pub message: String,
}

impl PlanningError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for PlanningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "planning failed: {}", self.message)
    }
}

impl std::error::Error for PlanningError {}

/// Read-only inputs shared by every attempt of a run.
#[derive(Debug, Clone)]
pub struct PlanInputs {
    pub target_name: String,
    pub sample_name: String,
    pub expected: Table,
    sample_excerpt: String,
}

impl PlanInputs {
    /// Load and structurally validate the target's inputs.
    pub fn load(target: &TargetSpec) -> Result<Self, PlanningError> {
        let raw = fs::read(&target.sample_path).map_err(|err| {
            PlanningError::new(format!(
                "cannot read sample input {}: {err}",
                target.sample_path.display()
            ))
        })?;
        if raw.is_empty() {
            return Err(PlanningError::new(format!(
                "sample input {} is empty",
                target.sample_path.display()
            )));
        }

        let expected = Table::from_path(&target.expected_path)
            .map_err(|err| PlanningError::new(format!("{err:#}")))?;
        if expected.is_empty() || expected.row_count() == 0 {
            return Err(PlanningError::new(format!(
                "expected output {} is empty",
                target.expected_path.display()
            )));
        }

        let sample_name = target
            .sample_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| target.sample_path.display().to_string());

        Ok(Self {
            target_name: target.name.clone(),
            sample_name,
            expected,
            sample_excerpt: excerpt_of(&raw),
        })
    }
}

/// Produce the strategy document for the next attempt.
///
/// When `prior_attempts` is non-empty, the most recent failure text is
/// embedded verbatim and earlier failures are digested into a history
/// section, so every retry is informed by why its predecessors failed.
pub fn plan(inputs: &PlanInputs, prior_attempts: &[Attempt], prompt_budget_bytes: usize) -> Plan {
    let attempt = prior_attempts.len() as u32 + 1;
    let failure = prior_attempts.last().and_then(Attempt::failure_text);
    let history = history_digest(prior_attempts);

    let strategy = PromptBuilder::new(prompt_budget_bytes).build_strategy(&StrategyInputs {
        target_name: inputs.target_name.clone(),
        sample_name: inputs.sample_name.clone(),
        columns: inputs.expected.columns.clone(),
        row_count: inputs.expected.row_count(),
        expected_preview: expected_preview(&inputs.expected),
        sample_excerpt: inputs.sample_excerpt.clone(),
        failure,
        history,
    });

    Plan {
        version: PLAN_VERSION,
        attempt,
        strategy,
    }
}

/// One line per earlier failed attempt, oldest first; the latest failure has
/// its own section and is excluded here.
fn history_digest(prior_attempts: &[Attempt]) -> Option<String> {
    if prior_attempts.len() < 2 {
        return None;
    }
    let lines: Vec<String> = prior_attempts[..prior_attempts.len() - 1]
        .iter()
        .filter_map(|attempt| {
            attempt.failure_text().map(|text| {
                let first_line = text.lines().next().unwrap_or_default().to_string();
                format!("attempt {}: {first_line}", attempt.index)
            })
        })
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn expected_preview(expected: &Table) -> String {
    let preview = Table {
        columns: expected.columns.clone(),
        rows: expected.rows.iter().take(PREVIEW_ROWS).cloned().collect(),
    };
    let mut text = preview.to_csv_string();
    if expected.row_count() > PREVIEW_ROWS {
        text.push_str(&format!(
            "... ({} more rows)\n",
            expected.row_count() - PREVIEW_ROWS
        ));
    }
    text
}

fn excerpt_of(raw: &[u8]) -> String {
    let slice = &raw[..raw.len().min(SAMPLE_EXCERPT_BYTES)];
    String::from_utf8_lossy(slice).into_owned()
}
