//! threadscript command-line host
//!
//! Runs script files as concurrent tasks against one engine and prints the
//! shared store when they are torn down.

mod helpers;
mod types;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use threadscript_engine::Engine;
use threadscript_protocol::TaskField;
use threadscript_script_host::Program;
use tracing_subscriber::EnvFilter;

use helpers::{AppError, load_config, read_script};
use types::{CheckReport, LineFailure, RunReport, TaskReport};

#[derive(Debug, Parser)]
#[command(name = "threadscript", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run each script as its own task, then print the variable store
    Run {
        #[arg(required = true)]
        scripts: Vec<PathBuf>,

        /// Engine config file (JSON)
        #[arg(long, env = "THREADSCRIPT_CONFIG")]
        config: Option<PathBuf>,

        /// How long to let the tasks run before destroying them
        #[arg(long, default_value_t = 1000)]
        duration_ms: u64,
    },
    /// Report lines that would stop a script, without running it
    Check { script: PathBuf },
}

fn main() -> ExitCode {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "threadscript=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = match cli.command {
        Command::Run {
            scripts,
            config,
            duration_ms,
        } => load_config(config.as_deref()).and_then(|config| {
            let engine = Engine::new(config);
            let report = run_scripts(&engine, &scripts, Duration::from_millis(duration_ms))?;
            Ok(serde_json::to_string_pretty(&report)?)
        }),
        Command::Check { script } => check_script(&script)
            .and_then(|report| Ok(serde_json::to_string_pretty(&report)?)),
    };

    match output {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Start every script, let them run for `duration`, then destroy them all
fn run_scripts(engine: &Engine, paths: &[PathBuf], duration: Duration) -> Result<RunReport, AppError> {
    // Read everything first so a bad path starts nothing
    let sources = paths
        .iter()
        .map(|path| read_script(path).map(|source| (path, source)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut started = Vec::with_capacity(sources.len());
    for (path, source) in sources {
        let id = engine.create_task(&source)?;
        tracing::info!(task_id = id.0, script = %path.display(), "Started script");
        started.push((id, path));
    }

    std::thread::sleep(duration);
    let stopped = engine.shutdown();
    tracing::info!(tasks = stopped, "All tasks destroyed");

    let tasks = started
        .into_iter()
        .map(|(id, path)| {
            let optional = |field| {
                let key = id.key(field);
                engine.has_var(&key).then(|| engine.get_var(&key))
            };
            TaskReport {
                id,
                script: path.display().to_string(),
                status: engine.get_var(&id.key(TaskField::Status)),
                error: optional(TaskField::Error),
                line: optional(TaskField::Line),
            }
        })
        .collect();

    Ok(RunReport {
        tasks,
        variables: engine.snapshot(),
    })
}

fn check_script(path: &Path) -> Result<CheckReport, AppError> {
    let program = Program::parse(&read_script(path)?);
    let failures = program
        .failing_lines()
        .map(|(line, error)| LineFailure {
            line: line.source_line,
            text: line.text.clone(),
            error: error.to_string(),
        })
        .collect();

    Ok(CheckReport {
        script: path.display().to_string(),
        lines: program.len(),
        failures,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::CommandFactory;
    use tempfile::NamedTempFile;

    use super::*;

    fn script(source: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{source}").unwrap();
        file
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_arguments() {
        let cli = Cli::parse_from(["threadscript", "run", "a.txt", "b.txt", "--duration-ms", "50"]);
        match cli.command {
            Command::Run {
                scripts,
                duration_ms,
                ..
            } => {
                assert_eq!(scripts.len(), 2);
                assert_eq!(duration_ms, 50);
            }
            Command::Check { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn check_reports_failing_lines() {
        let file = script("; header\nx := 1\n\nFoo()\nThreadSetVar(\"k\")\nx++\n");
        let report = check_script(file.path()).unwrap();
        assert_eq!(report.lines, 4);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].line, 4);
        assert_eq!(report.failures[0].error, "Unsupported function: Foo()");
        assert_eq!(report.failures[1].line, 5);
        assert_eq!(report.failures[1].error, "ThreadSetVar requires 2 args");
    }

    #[test]
    fn run_collects_task_state() {
        let ok = script("x := 2\nif x == 2\nSetVar(\"answer\",\"two\")\nend");
        let broken = script("Nope()");
        let engine = Engine::default();

        let report = run_scripts(
            &engine,
            &[ok.path().to_path_buf(), broken.path().to_path_buf()],
            Duration::from_millis(200),
        )
        .unwrap();

        assert_eq!(report.tasks.len(), 2);
        assert!(report.tasks.iter().all(|t| t.status == "completed"));
        assert_eq!(report.tasks[0].error, None);
        assert_eq!(
            report.tasks[1].error.as_deref(),
            Some("Unsupported function: Nope()")
        );
        assert_eq!(report.variables.get("answer").map(String::as_str), Some("two"));
        assert_eq!(engine.task_count(), 0);
    }

    #[test]
    fn run_with_missing_file_starts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::default();
        let result = run_scripts(&engine, &[dir.path().join("missing")], Duration::ZERO);
        assert!(matches!(result, Err(AppError::Io { .. })));
        assert_eq!(engine.task_count(), 0);
    }
}
