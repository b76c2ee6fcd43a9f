//! Shared types for the generation loop.
//!
//! These define the stable contracts between planner, generator, sandbox,
//! comparator, and controller. Everything here is plain data: serializable,
//! deterministic, and free of I/O.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::compare::MismatchReport;
use crate::core::table::Table;

/// Pipeline stage a diagnostic originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Plan,
    Generate,
    Execute,
}

/// Structured record of why a stage failed.
///
/// `detail` carries captured stderr/trace text and is surfaced verbatim to
/// the next planning call, so it must never be summarized away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub message: String,
    pub detail: Option<String>,
}

impl Diagnostic {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Plain-text rendering used in feedback prompts and on stderr.
    pub fn render(&self) -> String {
        let stage = match self.stage {
            Stage::Plan => "plan",
            Stage::Generate => "generate",
            Stage::Execute => "execute",
        };
        match &self.detail {
            Some(detail) => format!("[{stage}] {}\n{detail}", self.message),
            None => format!("[{stage}] {}", self.message),
        }
    }
}

/// Current revision of the plan document format.
pub const PLAN_VERSION: u32 = 1;

/// Strategy document for one attempt. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub version: u32,
    /// 1-indexed attempt this plan was produced for.
    pub attempt: u32,
    pub strategy: String,
}

/// Source text generated for one attempt, tagged for traceability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateModule {
    /// 1-indexed attempt that produced this module.
    pub attempt: u32,
    pub source: String,
    /// Hex SHA-256 of `source`.
    pub sha256: String,
}

impl CandidateModule {
    pub fn new(attempt: u32, source: String) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        let sha256 = hex::encode(hasher.finalize());
        Self {
            attempt,
            source,
            sha256,
        }
    }
}

/// Outcome of running a candidate module against the sample input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionResult {
    Produced { table: Table },
    Failed { diagnostic: Diagnostic },
}

/// Terminal classification of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The backend failed to produce usable source.
    GenerationFailed { diagnostic: Diagnostic },
    /// The candidate faulted (load error, runtime failure, timeout, or
    /// output-contract violation).
    ExecutionFailed {
        module: CandidateModule,
        diagnostic: Diagnostic,
    },
    /// The candidate ran but its table diverged from the expected one.
    Mismatched {
        module: CandidateModule,
        report: MismatchReport,
    },
    /// The candidate's table matched.
    Matched { module: CandidateModule },
}

/// One full pass through plan -> generate -> execute -> compare.
///
/// Attempts are append-only once recorded; later attempts supersede earlier
/// modules without erasing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-indexed position in the run.
    pub index: u32,
    pub plan: Plan,
    pub outcome: AttemptOutcome,
}

impl Attempt {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Matched { .. })
    }

    /// Rendered failure text fed into the next attempt's plan, `None` for a
    /// matched attempt.
    pub fn failure_text(&self) -> Option<String> {
        match &self.outcome {
            AttemptOutcome::GenerationFailed { diagnostic }
            | AttemptOutcome::ExecutionFailed { diagnostic, .. } => Some(diagnostic.render()),
            AttemptOutcome::Mismatched { report, .. } => {
                Some(format!("output table diverged:\n{}", report.render()))
            }
            AttemptOutcome::Matched { .. } => None,
        }
    }
}

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The final module was persisted at `module_path`.
    Succeeded { module_path: String },
    /// The attempt budget ran out; `last_failure` is the final attempt's
    /// failure text, verbatim.
    Exhausted { last_failure: String },
}

/// The persisted record of a whole run, written for both terminal outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub target: String,
    pub run_id: String,
    /// RFC 3339 timestamps.
    pub started_at: String,
    pub finished_at: String,
    pub max_attempts: u32,
    pub attempts: Vec<Attempt>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, RunOutcome::Succeeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_hash_is_stable_and_content_addressed() {
        let a = CandidateModule::new(1, "print('hi')\n".to_string());
        let b = CandidateModule::new(2, "print('hi')\n".to_string());
        let c = CandidateModule::new(1, "print('bye')\n".to_string());
        assert_eq!(a.sha256, b.sha256);
        assert_ne!(a.sha256, c.sha256);
        assert_eq!(a.sha256.len(), 64);
    }

    #[test]
    fn diagnostic_render_includes_detail_verbatim() {
        let diag = Diagnostic::new(Stage::Execute, "exit status 1")
            .with_detail("Traceback: boom at line 3");
        let rendered = diag.render();
        assert!(rendered.starts_with("[execute] exit status 1"));
        assert!(rendered.contains("Traceback: boom at line 3"));
    }

    #[test]
    fn failure_text_covers_all_failed_variants() {
        let plan = Plan {
            version: PLAN_VERSION,
            attempt: 1,
            strategy: "s".to_string(),
        };
        let module = CandidateModule::new(1, "src".to_string());

        let generation = Attempt {
            index: 1,
            plan: plan.clone(),
            outcome: AttemptOutcome::GenerationFailed {
                diagnostic: Diagnostic::new(Stage::Generate, "backend unreachable"),
            },
        };
        assert!(
            generation
                .failure_text()
                .expect("failure text")
                .contains("backend unreachable")
        );

        let matched = Attempt {
            index: 2,
            plan,
            outcome: AttemptOutcome::Matched { module },
        };
        assert!(matched.succeeded());
        assert_eq!(matched.failure_text(), None);
    }

    #[test]
    fn run_report_round_trips_through_json() {
        let report = RunReport {
            target: "icici".to_string(),
            run_id: "run-20250101_000000".to_string(),
            started_at: "2025-01-01T00:00:00Z".to_string(),
            finished_at: "2025-01-01T00:01:00Z".to_string(),
            max_attempts: 3,
            attempts: vec![Attempt {
                index: 1,
                plan: Plan {
                    version: PLAN_VERSION,
                    attempt: 1,
                    strategy: "strategy".to_string(),
                },
                outcome: AttemptOutcome::GenerationFailed {
                    diagnostic: Diagnostic::new(Stage::Generate, "empty reply"),
                },
            }],
            outcome: RunOutcome::Exhausted {
                last_failure: "[generate] empty reply".to_string(),
            },
        };

        let json = serde_json::to_string_pretty(&report).expect("serialize");
        let loaded: RunReport = serde_json::from_str(&json).expect("parse");
        assert_eq!(loaded, report);
        assert!(!loaded.succeeded());
    }
}
