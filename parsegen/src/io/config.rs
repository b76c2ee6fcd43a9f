//! Agent configuration stored under `.parsegen/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::compare::ComparePolicy;

/// Agent configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Attempt budget used when no per-run override is given.
    pub max_attempts_default: u32,

    /// Wall-clock budget for one backend call in seconds.
    pub generation_timeout_secs: u64,

    /// Wall-clock budget for one candidate execution in seconds.
    pub execution_timeout_secs: u64,

    /// Truncate backend stdout/stderr logs beyond this many bytes.
    pub backend_output_limit_bytes: usize,

    /// Truncate candidate stdout/stderr logs beyond this many bytes.
    pub exec_output_limit_bytes: usize,

    /// Maximum bytes for a prompt pack before dropping sections.
    pub prompt_budget_bytes: usize,

    /// Numeric cells compare equal within this tolerance.
    pub numeric_tolerance: f64,

    /// When false, produced/expected rows are compared order-insensitively.
    pub ordered_rows: bool,

    /// Directory (relative to the project root) where final modules land.
    pub modules_dir: String,

    /// File extension for generated modules.
    pub module_extension: String,

    pub backend: BackendConfig,
    pub interpreter: InterpreterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// Command prefix for the text-generation backend; the prompt is piped
    /// to stdin and the reply read from stdout.
    pub command: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "codex".to_string(),
                "exec".to_string(),
                "--skip-git-repo-check".to_string(),
                "-".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Command prefix used to run generated modules
    /// (`<command...> <module> <input> <output>`).
    pub command: Vec<String>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            command: vec!["python3".to_string()],
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_attempts_default: 3,
            generation_timeout_secs: 10 * 60,
            execution_timeout_secs: 2 * 60,
            backend_output_limit_bytes: 200_000,
            exec_output_limit_bytes: 100_000,
            prompt_budget_bytes: 40_000,
            numeric_tolerance: 1e-9,
            ordered_rows: true,
            modules_dir: "custom_parsers".to_string(),
            module_extension: "py".to_string(),
            backend: BackendConfig::default(),
            interpreter: InterpreterConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts_default == 0 {
            return Err(anyhow!("max_attempts_default must be > 0"));
        }
        if self.generation_timeout_secs == 0 {
            return Err(anyhow!("generation_timeout_secs must be > 0"));
        }
        if self.execution_timeout_secs == 0 {
            return Err(anyhow!("execution_timeout_secs must be > 0"));
        }
        if self.backend_output_limit_bytes == 0 {
            return Err(anyhow!("backend_output_limit_bytes must be > 0"));
        }
        if self.exec_output_limit_bytes == 0 {
            return Err(anyhow!("exec_output_limit_bytes must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.numeric_tolerance < 0.0 {
            return Err(anyhow!("numeric_tolerance must be >= 0"));
        }
        if self.modules_dir.trim().is_empty() {
            return Err(anyhow!("modules_dir must be non-empty"));
        }
        if self.module_extension.trim().is_empty() {
            return Err(anyhow!("module_extension must be non-empty"));
        }
        if self.backend.command.is_empty() || self.backend.command[0].trim().is_empty() {
            return Err(anyhow!("backend.command must be a non-empty array"));
        }
        if self.interpreter.command.is_empty() || self.interpreter.command[0].trim().is_empty() {
            return Err(anyhow!("interpreter.command must be a non-empty array"));
        }
        Ok(())
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    pub fn compare_policy(&self) -> ComparePolicy {
        ComparePolicy {
            numeric_tolerance: self.numeric_tolerance,
            ordered_rows: self.ordered_rows,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
