//! Self-correcting parser-generation agent CLI.
//!
//! `parsegen run <target>` drives the bounded-retry loop for one target and
//! persists the winning parser module plus a run report; the other commands
//! inspect targets, revalidate persisted modules, and summarize past runs.

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};

use parsegen::check::{CheckOutcome, check_target};
use parsegen::exit_codes;
use parsegen::io::backend::CommandBackend;
use parsegen::io::config::load_config;
use parsegen::io::paths::ProjectPaths;
use parsegen::io::report::{latest_run_dir, load_report};
use parsegen::io::target::{list_targets, resolve_target};
use parsegen::run::{CancelToken, run_target};

#[derive(Parser)]
#[command(
    name = "parsegen",
    version,
    about = "Self-correcting parser generation agent"
)]
struct Cli {
    /// Project root holding data/, the modules directory, and .parsegen/.
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a parser for a target, retrying until it matches.
    Run {
        target: String,
        /// Override the configured attempt budget.
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Re-run the persisted parser for a target and compare its output.
    Check { target: String },
    /// List resolvable targets under the data directory.
    Targets,
    /// Summarize the most recent run for a target.
    Report { target: String },
}

fn main() {
    parsegen::logging::init();
    match run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let paths = ProjectPaths::new(&cli.root);
    let config = load_config(&paths.config_path)?;

    match cli.command {
        Command::Run {
            target,
            max_attempts,
        } => {
            let spec = resolve_target(&paths, &config, &target, max_attempts)?;
            let backend = CommandBackend::new(config.backend.command.clone());
            let report = run_target(&backend, &spec, &config, &paths, &CancelToken::new())?;
            match &report.outcome {
                parsegen::core::types::RunOutcome::Succeeded { module_path } => {
                    println!("success: target={} module={}", report.target, module_path);
                    Ok(exit_codes::OK)
                }
                parsegen::core::types::RunOutcome::Exhausted { last_failure } => {
                    eprintln!(
                        "exhausted: target={} after {} attempts",
                        report.target,
                        report.attempts.len()
                    );
                    eprintln!("{last_failure}");
                    Ok(exit_codes::EXHAUSTED)
                }
            }
        }
        Command::Check { target } => {
            let spec = resolve_target(&paths, &config, &target, None)?;
            match check_target(&spec, &config, &paths)? {
                CheckOutcome::Match => {
                    println!("check: target={target} ok");
                    Ok(exit_codes::OK)
                }
                CheckOutcome::Mismatch { report } => {
                    eprintln!("check: target={target} diverged");
                    eprintln!("{}", report.render());
                    Ok(exit_codes::MISMATCH)
                }
                CheckOutcome::ExecutionFailed { diagnostic } => {
                    eprintln!("check: target={target} failed to execute");
                    eprintln!("{}", diagnostic.render());
                    Ok(exit_codes::MISMATCH)
                }
            }
        }
        Command::Targets => {
            for name in list_targets(&paths)? {
                println!("{name}");
            }
            Ok(exit_codes::OK)
        }
        Command::Report { target } => {
            let run_dir = latest_run_dir(&paths.runs_dir, &target)?;
            let report = load_report(&run_dir.join("report.json"))?;
            println!(
                "report: target={} run={} attempts={}/{}",
                report.target,
                report.run_id,
                report.attempts.len(),
                report.max_attempts
            );
            for attempt in &report.attempts {
                let summary = attempt
                    .failure_text()
                    .map(|text| text.lines().next().unwrap_or_default().to_string())
                    .unwrap_or_else(|| "matched".to_string());
                println!("report: attempt {} {}", attempt.index, summary);
            }
            match &report.outcome {
                parsegen::core::types::RunOutcome::Succeeded { module_path } => {
                    println!("report: outcome=succeeded module={module_path}");
                }
                parsegen::core::types::RunOutcome::Exhausted { .. } => {
                    println!("report: outcome=exhausted");
                }
            }
            Ok(exit_codes::OK)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run() {
        let cli = Cli::parse_from(["parsegen", "run", "icici"]);
        assert!(matches!(
            cli.command,
            Command::Run {
                max_attempts: None,
                ..
            }
        ));
    }

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "parsegen",
            "run",
            "icici",
            "--max-attempts",
            "5",
            "--root",
            "/work",
        ]);
        assert_eq!(cli.root, PathBuf::from("/work"));
        match cli.command {
            Command::Run {
                target,
                max_attempts,
            } => {
                assert_eq!(target, "icici");
                assert_eq!(max_attempts, Some(5));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_check_and_targets() {
        let cli = Cli::parse_from(["parsegen", "check", "icici"]);
        assert!(matches!(cli.command, Command::Check { .. }));

        let cli = Cli::parse_from(["parsegen", "targets"]);
        assert!(matches!(cli.command, Command::Targets));
    }
}
