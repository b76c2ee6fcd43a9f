//! Generation stage: build the backend request from a plan, package the
//! reply as a candidate module.
//!
//! No semantic validation happens here; whatever source the backend returns
//! is judged by running it. Every failure mode of this stage is recoverable
//! and consumes one attempt.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::core::types::{CandidateModule, Diagnostic, Plan, Stage};
use crate::io::backend::{GenerationRequest, TextBackend};
use crate::io::prompt::PromptBuilder;

/// Recoverable generation failure: the backend produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationError {
    pub message: String,
}

impl GenerationError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(Stage::Generate, self.message.clone())
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generation failed: {}", self.message)
    }
}

impl std::error::Error for GenerationError {}

/// Stage limits and artifact paths for one generation call.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    pub prompt_budget_bytes: usize,
}

/// Invoke the backend for one plan and package its reply.
#[instrument(skip_all, fields(attempt = plan.attempt))]
pub fn generate<B: TextBackend>(
    backend: &B,
    plan: &Plan,
    options: &GenerateOptions,
) -> Result<CandidateModule, GenerationError> {
    let prompt = PromptBuilder::new(options.prompt_budget_bytes).build_module_prompt(&plan.strategy);

    let reply = backend
        .complete(&GenerationRequest {
            prompt,
            log_path: options.log_path.clone(),
            timeout: options.timeout,
            output_limit_bytes: options.output_limit_bytes,
        })
        .map_err(|err| GenerationError::new(format!("{err:#}")))?;

    let source = strip_code_fences(&reply);
    if source.trim().is_empty() {
        return Err(GenerationError::new("backend returned an empty reply"));
    }

    let module = CandidateModule::new(plan.attempt, source);
    debug!(sha256 = %module.sha256, bytes = module.source.len(), "candidate packaged");
    Ok(module)
}

/// Extract the first fenced code block if the reply is wrapped in one;
/// otherwise return the reply trimmed. Language tags after the opening fence
/// are discarded.
fn strip_code_fences(reply: &str) -> String {
    let mut in_block = false;
    let mut block = String::new();
    for line in reply.lines() {
        if line.trim_start().starts_with("```") {
            if in_block {
                return block;
            }
            in_block = true;
            continue;
        }
        if in_block {
            block.push_str(line);
            block.push('\n');
        }
    }
    // No complete fenced block: treat the whole reply as source.
    format!("{}\n", reply.trim())
}
