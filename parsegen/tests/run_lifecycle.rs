//! End-to-end lifecycle tests for the generation loop, using scripted
//! backends and shell-script candidates so no model or interpreter beyond
//! `sh` is needed.

use parsegen::check::{CheckOutcome, check_target};
use parsegen::core::compare::CellDiff;
use parsegen::core::types::{AttemptOutcome, RunOutcome};
use parsegen::io::report::{RunPaths, load_report};
use parsegen::run::{CancelToken, run_target};
use parsegen::test_support::{
    ScriptedBackend, TestProject, sh_module_emitting, sh_module_failing, table_json,
};

const EXPECTED_CSV: &str = "Date,Balance\n01-08-2024,100.00\n02-08-2024,90.50\n03-08-2024,70.25\n";

fn full_table_json() -> String {
    table_json(
        &["Date", "Balance"],
        &[
            &["01-08-2024", "100.00"],
            &["02-08-2024", "90.50"],
            &["03-08-2024", "70.25"],
        ],
    )
}

fn short_table_json() -> String {
    table_json(
        &["Date", "Balance"],
        &[&["01-08-2024", "100.00"], &["02-08-2024", "90.50"]],
    )
}

#[test]
fn missing_row_is_retried_with_feedback_and_then_succeeds() {
    let project = TestProject::new().expect("project");
    project
        .seed_target("icici", EXPECTED_CSV, b"statement body")
        .expect("seed");
    let target = project.resolve("icici", None).expect("resolve");

    let backend = ScriptedBackend::new(vec![
        Ok(sh_module_emitting(&short_table_json())),
        Ok(sh_module_emitting(&full_table_json())),
    ]);

    let report = run_target(
        &backend,
        &target,
        &project.config(),
        &project.paths(),
        &CancelToken::new(),
    )
    .expect("run");

    assert!(report.succeeded());
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(backend.consumed(), 2);

    // Attempt 1: exactly one row-count discrepancy.
    match &report.attempts[0].outcome {
        AttemptOutcome::Mismatched { report, .. } => {
            assert_eq!(
                report.diffs,
                vec![CellDiff::RowCountDiffers {
                    produced: 2,
                    expected: 3
                }]
            );
        }
        other => panic!("expected mismatch on attempt 1, got {other:?}"),
    }

    // Feedback propagation: attempt 2's plan carries attempt 1's failure
    // text verbatim.
    let failure = report.attempts[0].failure_text().expect("failure text");
    assert!(report.attempts[1].plan.strategy.contains(&failure));

    // The persisted module matches under the same comparator the loop used.
    assert!(target.module_path.is_file());
    let outcome = check_target(&target, &project.config(), &project.paths()).expect("check");
    assert_eq!(outcome, CheckOutcome::Match);
}

#[test]
fn three_execution_failures_exhaust_the_budget() {
    let project = TestProject::new().expect("project");
    project
        .seed_target("icici", EXPECTED_CSV, b"statement body")
        .expect("seed");
    let target = project.resolve("icici", Some(3)).expect("resolve");

    let backend = ScriptedBackend::new(vec![
        Ok(sh_module_failing("ValueError: page 1")),
        Ok(sh_module_failing("ValueError: page 2")),
        Ok(sh_module_failing("ValueError: page 3")),
    ]);

    let report = run_target(
        &backend,
        &target,
        &project.config(),
        &project.paths(),
        &CancelToken::new(),
    )
    .expect("run");

    assert!(!report.succeeded());
    assert_eq!(report.attempts.len(), 3);
    for attempt in &report.attempts {
        assert!(matches!(
            attempt.outcome,
            AttemptOutcome::ExecutionFailed { .. }
        ));
    }
    match &report.outcome {
        RunOutcome::Exhausted { last_failure } => {
            assert!(last_failure.contains("ValueError: page 3"));
        }
        RunOutcome::Succeeded { .. } => panic!("expected exhaustion"),
    }
    assert!(!target.module_path.exists(), "no module persisted");

    // The report survives on disk for post-mortem inspection.
    let run_paths = RunPaths::new(&project.paths().runs_dir, "icici", &report.run_id);
    let loaded = load_report(&run_paths.report_path).expect("load report");
    assert_eq!(loaded, report);
    assert!(run_paths.attempt_dir(3).join("attempt.json").is_file());
    assert!(run_paths.exec_log_path(3).is_file());
}

#[test]
fn backend_failure_consumes_an_attempt_and_the_loop_continues() {
    let project = TestProject::new().expect("project");
    project
        .seed_target("icici", EXPECTED_CSV, b"statement body")
        .expect("seed");
    let target = project.resolve("icici", None).expect("resolve");

    let backend = ScriptedBackend::new(vec![
        Err("backend timed out after 600s".to_string()),
        Ok(sh_module_emitting(&full_table_json())),
    ]);

    let report = run_target(
        &backend,
        &target,
        &project.config(),
        &project.paths(),
        &CancelToken::new(),
    )
    .expect("run");

    assert!(report.succeeded());
    assert_eq!(report.attempts.len(), 2);
    match &report.attempts[0].outcome {
        AttemptOutcome::GenerationFailed { diagnostic } => {
            assert!(diagnostic.message.contains("timed out"));
        }
        other => panic!("expected generation failure, got {other:?}"),
    }
    // The timeout diagnostic reached the retry plan.
    assert!(report.attempts[1].plan.strategy.contains("timed out"));
}

#[test]
fn attempt_count_never_exceeds_the_budget() {
    let project = TestProject::new().expect("project");
    project
        .seed_target("icici", EXPECTED_CSV, b"statement body")
        .expect("seed");

    for max_attempts in [1, 2, 4] {
        let target = project.resolve("icici", Some(max_attempts)).expect("resolve");
        let backend = ScriptedBackend::new(vec![
            Err("unreachable".to_string()),
            Err("unreachable".to_string()),
            Err("unreachable".to_string()),
            Err("unreachable".to_string()),
            Err("unreachable".to_string()),
        ]);

        let report = run_target(
            &backend,
            &target,
            &project.config(),
            &project.paths(),
            &CancelToken::new(),
        )
        .expect("run");

        assert_eq!(report.attempts.len(), max_attempts as usize);
        assert_eq!(backend.consumed(), max_attempts as usize);
        assert!(matches!(report.outcome, RunOutcome::Exhausted { .. }));
    }
}

#[test]
fn malformed_candidate_output_is_a_contract_violation_not_a_crash() {
    let project = TestProject::new().expect("project");
    project
        .seed_target("icici", EXPECTED_CSV, b"statement body")
        .expect("seed");
    let target = project.resolve("icici", Some(1)).expect("resolve");

    // Candidate writes prose instead of table JSON.
    let backend = ScriptedBackend::new(vec![Ok(sh_module_emitting("not json at all"))]);

    let report = run_target(
        &backend,
        &target,
        &project.config(),
        &project.paths(),
        &CancelToken::new(),
    )
    .expect("run");

    assert_eq!(report.attempts.len(), 1);
    match &report.attempts[0].outcome {
        AttemptOutcome::ExecutionFailed { diagnostic, .. } => {
            assert!(diagnostic.message.contains("table contract"));
        }
        other => panic!("expected execution failure, got {other:?}"),
    }
}
