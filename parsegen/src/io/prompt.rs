//! Prompt pack builder for deterministic backend and planner input.
//!
//! Rendered templates are split into sections via HTML comment markers
//! (`<!-- section:KEY required|droppable -->`) so a byte budget can drop the
//! least critical sections first instead of truncating blindly.

use minijinja::{Environment, context};
use std::sync::LazyLock;
use tracing::debug;

const STRATEGY_TEMPLATE: &str = include_str!("prompts/strategy.md");
const MODULE_TEMPLATE: &str = include_str!("prompts/module.md");

static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").unwrap()
});

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("strategy", STRATEGY_TEMPLATE)
            .expect("strategy template should be valid");
        env.add_template("module", MODULE_TEMPLATE)
            .expect("module template should be valid");
        Self { env }
    }

    fn render_strategy(&self, input: &StrategyInputs) -> String {
        let template = self
            .env
            .get_template("strategy")
            .expect("strategy template is registered");
        template
            .render(context! {
                target_name => input.target_name,
                sample_name => input.sample_name,
                columns => input.columns.join(", "),
                column_count => input.columns.len(),
                row_count => input.row_count,
                expected_preview => input.expected_preview.trim(),
                sample_excerpt => input.sample_excerpt.trim(),
                failure => input.failure.as_deref().map(str::trim).filter(|s| !s.is_empty()),
                history => input.history.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            })
            .expect("strategy template rendering should not fail")
    }

    fn render_module(&self, strategy: &str) -> String {
        let template = self
            .env
            .get_template("module")
            .expect("module template is registered");
        template
            .render(context! { strategy => strategy.trim() })
            .expect("module template rendering should not fail")
    }
}

/// Inputs for one strategy rendering.
#[derive(Debug, Clone)]
pub struct StrategyInputs {
    pub target_name: String,
    /// File name of the sample document.
    pub sample_name: String,
    /// Expected column names, in order.
    pub columns: Vec<String>,
    /// Expected data row count.
    pub row_count: usize,
    /// CSV preview of the expected table.
    pub expected_preview: String,
    /// Possibly-lossy excerpt of the sample document.
    pub sample_excerpt: String,
    /// Most recent failure text, verbatim. Never dropped by the budget.
    pub failure: Option<String>,
    /// Digest of earlier failures, oldest first.
    pub history: Option<String>,
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    /// Full section content following the marker.
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let mut sections = Vec::new();
    let matches: Vec<_> = SECTION_RE.captures_iter(rendered).collect();

    for (i, caps) in matches.iter().enumerate() {
        let key = caps.get(1).unwrap().as_str().to_string();
        let required = caps.get(2).unwrap().as_str() == "required";
        let start = caps.get(0).unwrap().end();
        let end = matches
            .get(i + 1)
            .map(|m| m.get(0).unwrap().start())
            .unwrap_or(rendered.len());

        let content = rendered[start..end].trim().to_string();
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key,
                required,
                content,
            });
        }
    }

    sections
}

/// Apply the budget, dropping droppable sections in declared order, then
/// truncating the last section if the pack is still over.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize, drop_order: &[&str]) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    if total_len(sections) <= budget {
        return;
    }

    for key in drop_order {
        if total_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == *key && !s.required) {
            let dropped_len = sections[idx].content.len();
            debug!(
                section = key,
                bytes_dropped = dropped_len,
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    if total_len(sections) > budget && !sections.is_empty() {
        let other_len: usize = sections
            .iter()
            .take(sections.len() - 1)
            .map(|s| s.content.len())
            .sum();
        let allowed = budget.saturating_sub(other_len);
        let last = sections.last_mut().unwrap();
        if last.content.len() > allowed {
            let before_len = last.content.len();
            let mut end = allowed.saturating_sub(12).min(last.content.len());
            while !last.content.is_char_boundary(end) {
                end -= 1;
            }
            last.content.truncate(end);
            last.content.push_str("\n[truncated]");
            debug!(
                section = last.key,
                before_len,
                after_len = last.content.len(),
                "truncated section for budget"
            );
        }
    }
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds prompt packs within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// Render the strategy document for one attempt.
    ///
    /// Drop order: history first (older failures digest), then the sample
    /// excerpt. The expected table and the latest failure never drop.
    pub fn build_strategy(&self, input: &StrategyInputs) -> String {
        let rendered = PromptEngine::new().render_strategy(input);
        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes, &["history", "sample"]);
        render_sections(&sections)
    }

    /// Render the backend prompt: fixed module contract plus strategy.
    pub fn build_module_prompt(&self, strategy: &str) -> String {
        let rendered = PromptEngine::new().render_module(strategy);
        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes, &[]);
        render_sections(&sections)
    }
}
