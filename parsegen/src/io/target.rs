//! Target resolution: maps a target name to its on-disk inputs and outputs.
//!
//! Convention under `data/<name>/`: `<name>_sample.csv` is the expected
//! table, and exactly one other `<name>_sample.*` file is the sample
//! document. The destination module lands at
//! `<modules_dir>/<name>_parser.<ext>`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};

use crate::io::config::AgentConfig;
use crate::io::paths::ProjectPaths;

/// One resolved generation task. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub name: String,
    pub sample_path: PathBuf,
    pub expected_path: PathBuf,
    pub module_path: PathBuf,
    pub max_attempts: u32,
}

/// Resolve a named target under the project's data directory.
///
/// `max_attempts` falls back to `cfg.max_attempts_default` when no override
/// is given.
pub fn resolve_target(
    paths: &ProjectPaths,
    cfg: &AgentConfig,
    name: &str,
    max_attempts: Option<u32>,
) -> Result<TargetSpec> {
    if name.is_empty() || name.contains(['/', '\\']) {
        bail!("invalid target name '{name}'");
    }
    let target_dir = paths.data_dir.join(name);
    if !target_dir.is_dir() {
        bail!("target '{name}' not found at {}", target_dir.display());
    }

    let expected_path = target_dir.join(format!("{name}_sample.csv"));
    if !expected_path.is_file() {
        bail!(
            "target '{name}' has no expected table at {}",
            expected_path.display()
        );
    }

    let sample_path = find_sample(&target_dir, name, &expected_path)?;
    let module_path = paths
        .root
        .join(&cfg.modules_dir)
        .join(format!("{name}_parser.{}", cfg.module_extension));

    let max_attempts = max_attempts.unwrap_or(cfg.max_attempts_default);
    if max_attempts == 0 {
        bail!("max attempts must be > 0");
    }

    Ok(TargetSpec {
        name: name.to_string(),
        sample_path,
        expected_path,
        module_path,
        max_attempts,
    })
}

fn find_sample(target_dir: &Path, name: &str, expected_path: &Path) -> Result<PathBuf> {
    let prefix = format!("{name}_sample.");
    let mut candidates = Vec::new();
    for entry in
        fs::read_dir(target_dir).with_context(|| format!("read {}", target_dir.display()))?
    {
        let entry = entry.context("read entry")?;
        let path = entry.path();
        if path == *expected_path || !path.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        if file_name.to_string_lossy().starts_with(&prefix) {
            candidates.push(path);
        }
    }
    candidates.sort();
    match candidates.len() {
        0 => Err(anyhow!(
            "target '{name}' has no sample document ({prefix}*) in {}",
            target_dir.display()
        )),
        1 => Ok(candidates.remove(0)),
        _ => Err(anyhow!(
            "target '{name}' has multiple sample documents: {}",
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}

/// List target names that resolve under the data directory, sorted.
pub fn list_targets(paths: &ProjectPaths) -> Result<Vec<String>> {
    if !paths.data_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(&paths.data_dir)
        .with_context(|| format!("read {}", paths.data_dir.display()))?
    {
        let entry = entry.context("read entry")?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.path().join(format!("{name}_sample.csv")).is_file() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_target(root: &Path, name: &str, sample_ext: &str) {
        let dir = root.join("data").join(name);
        fs::create_dir_all(&dir).expect("target dir");
        fs::write(dir.join(format!("{name}_sample.csv")), "a,b\n1,2\n").expect("expected");
        fs::write(dir.join(format!("{name}_sample.{sample_ext}")), "doc").expect("sample");
    }

    #[test]
    fn resolves_paths_by_convention() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed_target(temp.path(), "icici", "pdf");
        let paths = ProjectPaths::new(temp.path());
        let cfg = AgentConfig::default();

        let spec = resolve_target(&paths, &cfg, "icici", None).expect("resolve");
        assert_eq!(spec.name, "icici");
        assert!(spec.sample_path.ends_with("data/icici/icici_sample.pdf"));
        assert!(spec.expected_path.ends_with("data/icici/icici_sample.csv"));
        assert!(spec.module_path.ends_with("custom_parsers/icici_parser.py"));
        assert_eq!(spec.max_attempts, cfg.max_attempts_default);
    }

    #[test]
    fn max_attempts_override_wins() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed_target(temp.path(), "icici", "pdf");
        let paths = ProjectPaths::new(temp.path());
        let spec =
            resolve_target(&paths, &AgentConfig::default(), "icici", Some(5)).expect("resolve");
        assert_eq!(spec.max_attempts, 5);

        let err = resolve_target(&paths, &AgentConfig::default(), "icici", Some(0)).unwrap_err();
        assert!(err.to_string().contains("max attempts"));
    }

    #[test]
    fn missing_target_and_missing_files_are_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        let cfg = AgentConfig::default();

        let err = resolve_target(&paths, &cfg, "ghost", None).unwrap_err();
        assert!(err.to_string().contains("not found"));

        fs::create_dir_all(temp.path().join("data/bare")).expect("dir");
        let err = resolve_target(&paths, &cfg, "bare", None).unwrap_err();
        assert!(err.to_string().contains("no expected table"));
    }

    #[test]
    fn ambiguous_samples_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed_target(temp.path(), "icici", "pdf");
        fs::write(temp.path().join("data/icici/icici_sample.txt"), "doc").expect("extra");
        let paths = ProjectPaths::new(temp.path());
        let err = resolve_target(&paths, &AgentConfig::default(), "icici", None).unwrap_err();
        assert!(err.to_string().contains("multiple sample documents"));
    }

    #[test]
    fn lists_only_resolvable_targets() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed_target(temp.path(), "icici", "pdf");
        seed_target(temp.path(), "axis", "pdf");
        fs::create_dir_all(temp.path().join("data/not-a-target")).expect("dir");

        let paths = ProjectPaths::new(temp.path());
        let names = list_targets(&paths).expect("list");
        assert_eq!(names, vec!["axis".to_string(), "icici".to_string()]);
    }
}
