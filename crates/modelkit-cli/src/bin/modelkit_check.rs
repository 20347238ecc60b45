//! Save/reload equivalence runner.
//!
//! Every registered case loads a model from the data directory, runs it,
//! serializes it, reloads the copy and requires the same result.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::builder::NonEmptyStringValueParser;
use clap::{CommandFactory, Parser};
use console::style;
use tracing::info;

use modelkit_cli::{guarded, init_logging};
use modelkit_core::equivalence::save_load_cases;
use modelkit_core::{CheckConfig, EquivalenceChecker};

/// Check that models give the same results after save and reload
#[derive(Parser)]
#[command(name = "modelkit-check")]
#[command(author, version, about, long_about = None, disable_help_flag = true)]
struct Cli {
    /// Data directory with `public/<model>/FP16/` and the coco128 images
    #[arg(short = 'd', long = "data-dir", value_parser = NonEmptyStringValueParser::new())]
    data_dir: Option<String>,

    /// Check settings file (JSON); flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Execution target
    #[arg(long)]
    device: Option<String>,

    /// Reloads per case
    #[arg(long)]
    reloads: Option<usize>,

    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print usage
    #[arg(short = 'h', long = "help", action = clap::ArgAction::SetTrue)]
    help: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::FAILURE;
        }
    };

    if cli.help {
        println!("{}", Cli::command().render_help());
        return ExitCode::FAILURE;
    }
    if cli.data_dir.is_none() && cli.config.is_none() {
        eprintln!("{}", Cli::command().render_usage());
        return ExitCode::FAILURE;
    }

    match init_logging(cli.verbose).and_then(|()| guarded(|| run(cli))) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("{} {:#}", style("error:").red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every case passed.
fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = match &cli.config {
        Some(path) => CheckConfig::from_file(path)?,
        None => CheckConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(device) = cli.device {
        config.device = device;
    }
    if let Some(reloads) = cli.reloads {
        config.reloads = reloads;
    }

    info!("Data directory: {}", config.data_dir.display());
    let checker = EquivalenceChecker::new(config)?;

    let cases = save_load_cases();
    let mut failed = 0;
    for case in &cases {
        match checker.check(case) {
            Ok(report) => println!(
                "{} {} ({} records, {} reloads)",
                style("✓").green(),
                case.name,
                report.records,
                report.reloads
            ),
            Err(err) => {
                failed += 1;
                println!("{} {}: {}", style("✗").red(), case.name, err);
            }
        }
    }

    println!();
    println!(
        "{} passed, {} failed",
        style(cases.len() - failed).green(),
        style(failed).red()
    );

    Ok(failed == 0)
}
