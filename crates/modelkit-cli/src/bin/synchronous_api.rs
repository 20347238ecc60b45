//! Load a model, read one image and run a single synchronous inference.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use console::style;
use tracing::{debug, info};

use modelkit_cli::{guarded, init_logging, FamilyArg};
use modelkit_core::{load_image, InferenceAdapter, InferenceResult, Model, Target};

/// Run one model on one image
#[derive(Parser)]
#[command(name = "synchronous-api")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Model graph (`.onnx`, manifest alongside)
    path_to_model: PathBuf,

    /// Input image
    path_to_image: PathBuf,

    /// Model family (default: taken from the model description)
    #[arg(long, value_enum)]
    family: Option<FamilyArg>,

    /// Execution target
    #[arg(long, default_value = "CPU")]
    device: String,

    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::FAILURE,
            };
        }
    };

    match init_logging(cli.verbose).and_then(|()| guarded(|| run(cli))) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", style("error:").red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // Image first, so a bad image never pays for a model load.
    let image = load_image(&cli.path_to_image).map_err(|e| {
        anyhow::anyhow!("Failed to read image {}: {}", cli.path_to_image.display(), e)
    })?;

    let target: Target = cli.device.parse()?;
    let adapter = InferenceAdapter::load(&cli.path_to_model, target).map_err(|e| {
        anyhow::anyhow!("Failed to load model {}: {}", cli.path_to_model.display(), e)
    })?;
    let model = Model::from_adapter_as(adapter, cli.family.map(Into::into))?;
    info!(
        "Loaded {} model with input {:?}",
        model.family(),
        model.input_size()
    );

    let result = model.infer(&image)?;
    info!("Inference produced {} {} records", result.len(), result.family());
    log_records(&result);

    Ok(())
}

fn log_records(result: &InferenceResult) {
    match result {
        InferenceResult::Classification(r) => {
            for class in &r.top_labels {
                debug!("{} {} {:.3}", class.id, class.label, class.score);
            }
        }
        InferenceResult::Detection(r) => {
            for object in &r.objects {
                debug!("{}", object);
            }
        }
        InferenceResult::InstanceSegmentation(r) => {
            for object in &r.objects {
                debug!("{}", object);
            }
        }
    }
}
