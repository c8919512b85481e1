//! timetabler CLI - Academic Timetabling Engine
//!
//! Command-line harness around the core pipeline: load a JSON problem
//! file, run generate → validate → resolve, print the report. The
//! scheduling semantics live entirely in `timetabler-solver`; this binary
//! only owns process concerns (arguments, logging, exit codes, I/O).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use timetabler_core::{CommittedEntry, NoCommitments, ScheduleProblem};
use timetabler_solver::{run_schedule, teacher_load_summary, CrossSemesterIndex, ScheduleRun};

mod exit;
use exit::ExitCode;

#[derive(Parser)]
#[command(name = "timetabler")]
#[command(author, version, about = "Academic timetabling engine", long_about = None)]
struct Cli {
    /// Verbose output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a problem file without scheduling
    Check {
        /// Input file path (JSON problem)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Generate a timetable and print the run report
    Schedule {
        /// Input file path (JSON problem)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Committed entries of other active configs (JSON)
        #[arg(long, value_name = "FILE")]
        committed: Option<PathBuf>,

        /// Emit the report as JSON instead of text
        #[arg(long)]
        json: bool,

        /// Write the produced entries to a file (JSON)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(cli) {
        Ok(code) => code.into(),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::Failure.into()
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::from_default_env(),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Check { file } => check(&file),
        Commands::Schedule {
            file,
            committed,
            json,
            output,
        } => schedule(&file, committed.as_deref(), json, output.as_deref(), cli.verbose),
    }
}

fn check(file: &Path) -> Result<ExitCode> {
    let problem = load_problem(file)?;
    match problem.validate() {
        Ok(()) => {
            let groups = problem.config.class_groups().len();
            println!(
                "ok: {} ({} groups, {} subjects, {} teachers, {} rooms)",
                problem.config.name,
                groups,
                problem.subjects.len(),
                problem.teachers.len(),
                problem.classrooms.len()
            );
            Ok(ExitCode::Success)
        }
        Err(err) => {
            eprintln!("invalid problem: {err}");
            Ok(ExitCode::Failure)
        }
    }
}

fn schedule(
    file: &Path,
    committed: Option<&Path>,
    json: bool,
    output: Option<&Path>,
    verbose: u8,
) -> Result<ExitCode> {
    let problem = load_problem(file)?;

    let run = match committed {
        Some(path) => {
            let entries = load_committed(path)?;
            let oracle = CrossSemesterIndex::new(&entries, &problem.config.name);
            run_schedule(&problem, &oracle)?
        }
        None => run_schedule(&problem, &NoCommitments)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&run.report)?);
    } else {
        print!("{}", run.report);
    }
    if verbose > 0 {
        print_teacher_loads(&run);
    }

    if let Some(path) = output {
        let payload = serde_json::to_string_pretty(&run.entries)?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write entries to {}", path.display()))?;
    }

    Ok(ExitCode::from_remaining_violations(
        run.report.final_violations,
    ))
}

fn print_teacher_loads(run: &ScheduleRun) {
    for load in teacher_load_summary(&run.entries) {
        eprintln!(
            "load: {} teaches {} classes, peak {} on {}",
            load.teacher, load.total_classes, load.peak_classes, load.peak_day
        );
    }
}

fn load_problem(path: &Path) -> Result<ScheduleProblem> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read problem file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse problem file {}", path.display()))
}

fn load_committed(path: &Path) -> Result<Vec<CommittedEntry>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read committed entries {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse committed entries {}", path.display()))
}
