//! Self-correcting parser-generation agent.
//!
//! Given a sample document and a reference table, the agent asks a
//! text-generation backend for a parser module, runs the candidate in
//! isolation, compares its output against the reference, and retries with
//! the failure folded into the next plan until the candidate matches or the
//! attempt budget runs out. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (table model, comparison, the
//!   retry state machine). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, config, subprocess
//!   execution, backend invocation). Isolated to enable mocking in tests.
//!
//! Orchestration modules ([`plan`], [`generate`], [`run`], [`check`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod check;
pub mod core;
pub mod exit_codes;
pub mod generate;
pub mod io;
pub mod logging;
pub mod plan;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
