//! Revalidation of a previously persisted parser module.
//!
//! Re-runs the module at the target's destination path against the sample
//! input and compares with the same policy the generation loop used, so a
//! stale or hand-edited parser can be caught without regenerating it.

use std::fs;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::compare::{ComparisonResult, MismatchReport, compare};
use crate::core::types::{Diagnostic, ExecutionResult};
use crate::io::config::AgentConfig;
use crate::io::paths::ProjectPaths;
use crate::io::sandbox::{ExecRequest, run_candidate};
use crate::io::target::TargetSpec;
use crate::plan::PlanInputs;

/// Outcome of revalidating a persisted module.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Match,
    Mismatch { report: MismatchReport },
    ExecutionFailed { diagnostic: Diagnostic },
}

/// Run the persisted module for `target` and compare its output.
#[instrument(skip_all, fields(target = %target.name))]
pub fn check_target(
    target: &TargetSpec,
    config: &AgentConfig,
    paths: &ProjectPaths,
) -> Result<CheckOutcome> {
    let source = fs::read_to_string(&target.module_path).with_context(|| {
        format!(
            "read module {} (run `parsegen run {}` first)",
            target.module_path.display(),
            target.name
        )
    })?;
    let inputs = PlanInputs::load(target)?;

    let log_path = paths
        .state_dir
        .join("check")
        .join(&target.name)
        .join("exec.log");
    let execution = run_candidate(&ExecRequest {
        interpreter: config.interpreter.command.clone(),
        module_filename: format!("{}_parser.{}", target.name, config.module_extension),
        source,
        sample_path: target.sample_path.clone(),
        log_path,
        timeout: config.execution_timeout(),
        output_limit_bytes: config.exec_output_limit_bytes,
    })?;

    let table = match execution {
        ExecutionResult::Produced { table } => table,
        ExecutionResult::Failed { diagnostic } => {
            return Ok(CheckOutcome::ExecutionFailed { diagnostic });
        }
    };

    let outcome = match compare(&table, &inputs.expected, &config.compare_policy()) {
        ComparisonResult::Match => CheckOutcome::Match,
        ComparisonResult::Mismatch { report } => CheckOutcome::Mismatch { report },
    };
    let matched = matches!(outcome, CheckOutcome::Match);
    info!(matched, "check finished");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestProject, sh_module_emitting, table_json};

    #[test]
    fn matching_module_passes() {
        let project = TestProject::new().expect("project");
        project
            .seed_target("icici", "a,b\n1,2\n", b"statement")
            .expect("seed");
        let target = project.resolve("icici", None).expect("resolve");

        let source = sh_module_emitting(&table_json(&["a", "b"], &[&["1", "2"]]));
        fs::create_dir_all(target.module_path.parent().expect("parent")).expect("modules dir");
        fs::write(&target.module_path, source).expect("module");

        let outcome =
            check_target(&target, &project.config(), &project.paths()).expect("check");
        assert_eq!(outcome, CheckOutcome::Match);
    }

    #[test]
    fn diverging_module_reports_mismatch() {
        let project = TestProject::new().expect("project");
        project
            .seed_target("icici", "a,b\n1,2\n", b"statement")
            .expect("seed");
        let target = project.resolve("icici", None).expect("resolve");

        let source = sh_module_emitting(&table_json(&["a", "b"], &[&["1", "9"]]));
        fs::create_dir_all(target.module_path.parent().expect("parent")).expect("modules dir");
        fs::write(&target.module_path, source).expect("module");

        match check_target(&target, &project.config(), &project.paths()).expect("check") {
            CheckOutcome::Mismatch { report } => {
                assert!(report.render().contains("column 'b'"));
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn missing_module_is_an_error() {
        let project = TestProject::new().expect("project");
        project
            .seed_target("icici", "a,b\n1,2\n", b"statement")
            .expect("seed");
        let target = project.resolve("icici", None).expect("resolve");

        let err = check_target(&target, &project.config(), &project.paths()).unwrap_err();
        assert!(err.to_string().contains("read module"));
    }
}
