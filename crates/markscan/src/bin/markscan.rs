//! `markscan` command-line front end.
//!
//! ```bash
//! # Grade scanned pages, report to a file
//! markscan grade --template exam.json --output report.json scans/*.png
//!
//! # Read the answer key from a filled-in master sheet
//! markscan key --template exam.json master.png > exam_keyed.json
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use markscan::core::PixelCache;
use markscan::{grade_batch, AnswerTemplate, FileImage, GradeError, ImageSource, PageGrader};
use serde::Serialize;

/// Grade scanned bubble-sheet exams against an answer template.
#[derive(Parser, Debug)]
#[command(name = "markscan")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level for stderr diagnostics (off, error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "warn")]
    log_level: LevelFilter,

    /// Emit JSON trace events instead of text logs.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Grade one or more scanned pages.
    Grade(GradeArgs),
    /// Detect the answer key on a master sheet and print the keyed template.
    Key(KeyArgs),
}

#[derive(Args, Debug)]
struct GradeArgs {
    /// Answer template (JSON).
    #[arg(long, short)]
    template: PathBuf,
    /// Write the report here instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Skip fiducial alignment and crop regions directly.
    #[arg(long)]
    no_align: bool,
    /// Scanned pages.
    #[arg(required = true)]
    pages: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct KeyArgs {
    /// Answer template (JSON).
    #[arg(long, short)]
    template: PathBuf,
    /// Write the keyed template here instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Master sheet with the correct answers marked.
    page: PathBuf,
}

fn init_logging(cli: &Cli) {
    #[cfg(feature = "tracing")]
    {
        let _ = tracing_log::LogTracer::init();
        markscan::core::init_tracing(cli.log_level, cli.json_logs);
    }
    #[cfg(not(feature = "tracing"))]
    {
        let _ = markscan::core::init_with_level(cli.log_level);
    }
}

fn emit<T: Serialize>(value: &T, output: Option<&PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => std::fs::write(path, json)?,
        None => writeln!(std::io::stdout().lock(), "{json}")?,
    }
    Ok(())
}

fn grade(args: &GradeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let template = AnswerTemplate::load_json(&args.template).map_err(GradeError::from)?;
    let mut grader = PageGrader::new(&template)?;
    if args.no_align {
        grader = grader.without_alignment();
    }
    let pages: Vec<FileImage> = args.pages.iter().map(FileImage::new).collect();
    let cache = PixelCache::default();
    let reports = grade_batch(&grader, &pages, &cache)?;
    cache.clear();

    let flagged: usize = reports.iter().map(|r| r.flagged().len()).sum();
    log::info!("graded {} pages, {flagged} answers flagged", reports.len());
    emit(&reports, args.output.as_ref())
}

fn key(args: &KeyArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut template = AnswerTemplate::load_json(&args.template).map_err(GradeError::from)?;
    let master = FileImage::new(&args.page).load()?;
    let detected = PageGrader::new(&template)?.detect_key(&master.view())?;
    let applied = template.apply_key(&detected);
    log::info!("{applied} of {} questions keyed", detected.len());
    emit(&template, args.output.as_ref())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match &cli.command {
        Command::Grade(args) => grade(args),
        Command::Key(args) => key(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}
